//! Parser and validator for the FlatDB language
//!
//! A single forward pass over the token stream with an index cursor. Each
//! recognized statement dispatches to a sub-parser that advances the cursor
//! and lowers the statement into instructions. A failed statement records
//! one diagnostic and parsing resumes at the next source line, so one
//! compile reports every independent error. Program emission is suppressed
//! entirely when any error was recorded.

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

use super::predicate;
use super::program::{Instruction, Program};
use super::scanner::{self, Scan};
use super::token::{Token, TokenKind};
use crate::catalog::{Attribute, Constraint, DataType, Relation};
use crate::error::{Diagnostics, Result};

/// Outcome of compiling a token stream: the program (present only when no
/// errors were recorded) plus every accumulated diagnostic.
#[derive(Debug)]
pub struct CompileResult {
    pub program: Option<Program>,
    pub diagnostics: Diagnostics,
}

/// Compile a scanned token stream.
pub fn compile(tokens: &[Token]) -> CompileResult {
    Compiler::new(tokens).compile()
}

/// Scan `source_path` and compile it, folding scanner diagnostics (missing
/// or malformed includes) into the compile diagnostics and attaching
/// original source lines to every diagnostic.
pub fn compile_source_file(source_path: impl AsRef<Path>) -> Result<CompileResult> {
    let Scan {
        tokens,
        line_table,
        diagnostics: scan_diagnostics,
    } = scanner::scan(source_path)?;

    let mut result = Compiler::new(&tokens).compile_with(scan_diagnostics);
    result.diagnostics.attach_sources(&line_table);
    if result.diagnostics.has_errors() {
        result.program = None;
    }
    Ok(result)
}

struct RelationEntry {
    line: usize,
    relation: Relation,
    has_attributes: bool,
}

struct Compiler<'a> {
    tokens: &'a [Token],
    position: usize,
    diagnostics: Diagnostics,
    program: Program,

    schemas: Vec<String>,
    current_schema: Option<String>,
    relations: IndexMap<String, RelationEntry>,
    arrays: IndexMap<String, usize>,
    used_relations: HashSet<String>,
    shown_arrays: HashSet<String>,
}

impl<'a> Compiler<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            position: 0,
            diagnostics: Diagnostics::new(),
            program: Program::new(),
            schemas: Vec::new(),
            current_schema: None,
            relations: IndexMap::new(),
            arrays: IndexMap::new(),
            used_relations: HashSet::new(),
            shown_arrays: HashSet::new(),
        }
    }

    fn compile(self) -> CompileResult {
        self.compile_with(Diagnostics::new())
    }

    fn compile_with(mut self, mut diagnostics: Diagnostics) -> CompileResult {
        while self.position < self.tokens.len() {
            if self.current().is_some_and(|t| t.is_eol()) {
                self.position += 1;
                continue;
            }

            if self.parse_statement().is_none() {
                self.skip_to_next_line();
            }
        }

        self.report_unused();

        for diagnostic in self.diagnostics.entries() {
            match diagnostic.severity {
                crate::error::Severity::Error => {
                    diagnostics.error(diagnostic.line, diagnostic.message.clone())
                }
                crate::error::Severity::Warning => {
                    diagnostics.warning(diagnostic.line, diagnostic.message.clone())
                }
            }
        }

        let program = if diagnostics.has_errors() {
            None
        } else {
            Some(self.program)
        };

        CompileResult {
            program,
            diagnostics,
        }
    }

    // ========== Cursor helpers ==========

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    /// Line number for a diagnostic at the current cursor.
    fn line(&self) -> usize {
        match self.current() {
            Some(token) => token.line,
            None => self.tokens.last().map_or(1, |t| t.line),
        }
    }

    fn error(&mut self, line: usize, message: impl Into<String>) {
        self.diagnostics.error(line, message);
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let line = self.line();
        self.error(line, message);
    }

    /// Advance past the next end-of-line marker; error recovery point.
    fn skip_to_next_line(&mut self) {
        while let Some(token) = self.advance() {
            if token.kind == TokenKind::Eol {
                break;
            }
        }
    }

    fn skip_eols(&mut self) {
        while self.current().is_some_and(|t| t.is_eol()) {
            self.position += 1;
        }
    }

    fn expect_separator(&mut self, separator: &str) -> Option<()> {
        if self.current().is_some_and(|t| t.is_separator(separator)) {
            self.position += 1;
            Some(())
        } else {
            let found = self.describe_current();
            self.error_here(format!("expected '{}', found {}", separator, found));
            None
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Option<String> {
        if self.current().is_some_and(|t| t.is_identifier()) {
            let lexeme = self.current().map(|t| t.lexeme.clone());
            self.position += 1;
            lexeme
        } else {
            let found = self.describe_current();
            self.error_here(format!("expected {}, found {}", what, found));
            None
        }
    }

    fn expect_eol(&mut self) -> Option<()> {
        match self.current() {
            None => Some(()),
            Some(token) if token.is_eol() => {
                self.position += 1;
                Some(())
            }
            Some(token) => {
                let lexeme = token.lexeme.clone();
                self.error_here(format!("unexpected '{}' after statement", lexeme));
                None
            }
        }
    }

    fn describe_current(&self) -> String {
        match self.current() {
            Some(token) if token.is_eol() => "end of line".to_string(),
            Some(token) => format!("'{}'", token.lexeme),
            None => "end of input".to_string(),
        }
    }

    // ========== Statement dispatch ==========

    fn parse_statement(&mut self) -> Option<()> {
        let (kind, lexeme) = {
            let token = self.current()?;
            (token.kind, token.lexeme.clone())
        };

        match kind {
            TokenKind::Keyword if lexeme == "schema" => self.parse_schema(),
            TokenKind::Keyword if lexeme == "using" => self.parse_using(),
            TokenKind::Keyword if lexeme == "relation" => self.parse_relation(),
            TokenKind::Keyword if lexeme == "let" => self.parse_let(),
            TokenKind::Identifier if lexeme == "show" && self.next_is_separator(":") => {
                self.parse_show()
            }
            TokenKind::Identifier if self.next_is_separator("->") => {
                self.parse_attributes_block()
            }
            TokenKind::Identifier if self.next_is_separator(".") => self.parse_method_call(),
            _ => {
                self.error_here(format!("unrecognized statement starting at '{}'", lexeme));
                None
            }
        }
    }

    fn next_is_separator(&self, separator: &str) -> bool {
        self.peek(1).is_some_and(|t| t.is_separator(separator))
    }

    // ========== schema : Name ==========

    fn parse_schema(&mut self) -> Option<()> {
        let line = self.line();
        self.advance();
        self.expect_separator(":")?;
        let name = self.expect_identifier("a schema name")?;
        self.expect_eol()?;

        // The statement line is fully consumed here, so semantic failures
        // below record their diagnostic and report the statement as parsed;
        // no resynchronization is needed.
        if self.schemas.contains(&name) {
            self.error(line, format!("schema '{}' was already declared", name));
            return Some(());
        }

        self.schemas.push(name.clone());
        self.program.push(Instruction::CreateSchema { schema: name });
        Some(())
    }

    // ========== using : Name ==========

    fn parse_using(&mut self) -> Option<()> {
        let line = self.line();
        self.advance();
        self.expect_separator(":")?;
        let name = self.expect_identifier("a schema name")?;
        self.expect_eol()?;

        if !self.schemas.contains(&name) {
            self.error(line, format!("schema '{}' was not declared", name));
            return Some(());
        }

        self.current_schema = Some(name);
        Some(())
    }

    // ========== relation : Name ==========

    fn parse_relation(&mut self) -> Option<()> {
        let line = self.line();
        self.advance();
        self.expect_separator(":")?;
        let name = self.expect_identifier("a relation name")?;
        self.expect_eol()?;

        let Some(schema) = self.current_schema.clone() else {
            self.error(
                line,
                format!("relation '{}' does not belong to any schema; missing 'using'", name),
            );
            return Some(());
        };

        if self.relations.contains_key(&name) {
            self.error(line, format!("relation '{}' was already declared", name));
            return Some(());
        }

        self.relations.insert(
            name.clone(),
            RelationEntry {
                line,
                relation: Relation::new(name.clone()),
                has_attributes: false,
            },
        );
        self.program
            .push(Instruction::CreateRelation { schema, relation: name });
        Some(())
    }

    // ========== Name -> {attr, type, constraint}, ... ==========

    fn parse_attributes_block(&mut self) -> Option<()> {
        let line = self.line();
        let name = self.expect_identifier("a relation name")?;
        self.expect_separator("->")?;

        if !self.relations.contains_key(&name) {
            self.error(line, format!("relation '{}' was not declared", name));
            return None;
        }
        if self.relations[&name].has_attributes {
            self.error(
                line,
                format!("attributes of relation '{}' were already declared", name),
            );
            return None;
        }

        let mut attributes: Vec<Attribute> = Vec::new();
        loop {
            let attribute = self.parse_attribute_group(&attributes)?;
            attributes.push(attribute);

            if self.current().is_some_and(|t| t.is_separator(",")) {
                self.position += 1;
                // Attribute groups may continue on the following line.
                self.skip_eols();
                continue;
            }
            break;
        }
        self.expect_eol()?;

        if !attributes.iter().any(|a| a.is_primary_key()) {
            self.diagnostics.warning(
                line,
                format!("relation '{}' declares no PK attribute", name),
            );
        }

        self.program.push(Instruction::CreateRelationAttributes {
            relation: name.clone(),
        });
        let entry = self.relations.get_mut(&name)?;
        entry.has_attributes = true;
        for attribute in attributes {
            self.program.push(Instruction::CreateAttribute {
                name: attribute.name.clone(),
                data_type: attribute.data_type.clone(),
                constraint: attribute.constraint,
            });
            entry.relation.add_attribute(attribute);
        }
        Some(())
    }

    fn parse_attribute_group(&mut self, declared: &[Attribute]) -> Option<Attribute> {
        self.expect_separator("{")?;
        let line = self.line();
        let name = self.expect_identifier("an attribute name")?;

        if declared.iter().any(|a| a.name == name) {
            self.error(line, format!("attribute '{}' was already declared", name));
            return None;
        }

        self.expect_separator(",")?;
        let data_type = self.parse_data_type()?;
        self.expect_separator(",")?;
        let constraint = self.parse_constraint()?;

        if constraint == Constraint::PrimaryKey && declared.iter().any(|a| a.is_primary_key()) {
            self.error(line, "relation may declare only one PK attribute");
            return None;
        }

        self.expect_separator("}")?;
        Some(Attribute::new(name, data_type, constraint))
    }

    fn parse_data_type(&mut self) -> Option<DataType> {
        let token = match self.current() {
            Some(token) if token.kind == TokenKind::Keyword => token.lexeme.clone(),
            _ => {
                let found = self.describe_current();
                self.error_here(format!("expected a datatype, found {}", found));
                return None;
            }
        };
        self.position += 1;

        let sized = match token.as_str() {
            "int" => return Some(DataType::Integer),
            "boolean" => return Some(DataType::Boolean),
            "date" => return Some(DataType::Date),
            "datetime" => return Some(DataType::Datetime),
            "uuid" => return Some(DataType::Uuid),
            "char" | "varchar" => token,
            other => {
                let message = format!("'{}' is not a valid datatype", other);
                self.error_here(message);
                return None;
            }
        };

        self.expect_separator("(")?;
        let size = match self.current() {
            Some(token) if token.is_constant() => token.lexeme.parse::<usize>().ok(),
            _ => None,
        };
        let Some(size) = size.filter(|s| *s > 0) else {
            let message = format!("size of {} must be a positive integer", sized);
            self.error_here(message);
            return None;
        };
        self.position += 1;
        self.expect_separator(")")?;

        Some(match sized.as_str() {
            "char" => DataType::Char(size),
            _ => DataType::Varchar(size),
        })
    }

    fn parse_constraint(&mut self) -> Option<Constraint> {
        let token = match self.current() {
            Some(token) if token.kind == TokenKind::Keyword => token.lexeme.clone(),
            _ => {
                let found = self.describe_current();
                self.error_here(format!("expected a constraint, found {}", found));
                return None;
            }
        };

        let constraint = match Constraint::parse(&token) {
            Ok(constraint) => constraint,
            Err(_) => {
                let message = format!("'{}' is not a valid constraint", token);
                self.error_here(message);
                return None;
            }
        };
        self.position += 1;
        Some(constraint)
    }

    // ========== Rel.method(...) ==========

    fn parse_method_call(&mut self) -> Option<()> {
        let line = self.line();
        let relation_name = self.expect_identifier("a relation name")?;
        self.expect_separator(".")?;

        let method = match self.current() {
            Some(token) if token.kind == TokenKind::Method => token.lexeme.clone(),
            _ => {
                let found = self.describe_current();
                self.error_here(format!("expected a method, found {}", found));
                return None;
            }
        };
        self.position += 1;

        if !self.relations.contains_key(&relation_name) {
            self.error(
                line,
                format!("relation '{}' was not declared", relation_name),
            );
            return None;
        }
        self.used_relations.insert(relation_name.clone());

        match method.as_str() {
            "add" => self.parse_add(&relation_name),
            "update" => self.parse_update(&relation_name),
            "delete" => self.parse_delete(&relation_name),
            "fetch" => {
                self.error(
                    line,
                    "fetch results must be assigned to an array with 'let'",
                );
                None
            }
            _ => None,
        }
    }

    fn parse_add(&mut self, relation_name: &str) -> Option<()> {
        let line = self.line();
        self.expect_separator("(")?;

        let mut values = Vec::new();
        if !self.current().is_some_and(|t| t.is_separator(")")) {
            loop {
                let value = match self.current() {
                    Some(token) if token.is_constant() || token.is_identifier() => {
                        token.unquoted()
                    }
                    _ => {
                        let found = self.describe_current();
                        self.error_here(format!("expected a value, found {}", found));
                        return None;
                    }
                };
                self.position += 1;
                values.push(value);

                if self.current().is_some_and(|t| t.is_separator(",")) {
                    self.position += 1;
                    continue;
                }
                break;
            }
        }
        self.expect_separator(")")?;
        self.expect_eol()?;

        let relation = &self.relations[relation_name].relation;
        if values.len() != relation.attribute_count() {
            let expected = relation.attribute_count();
            let found = values.len();
            self.error(
                line,
                format!(
                    "add on '{}' expects {} argument(s), found {}",
                    relation_name, expected, found
                ),
            );
            return Some(());
        }

        let mut mismatch = None;
        for (attribute, value) in relation.attributes().iter().zip(&values) {
            if !attribute.data_type.validate(value) {
                mismatch = Some(format!(
                    "'{}' is not a valid {} for attribute '{}'",
                    value, attribute.data_type, attribute.name
                ));
                break;
            }
        }
        if let Some(message) = mismatch {
            self.error(line, message);
            return Some(());
        }

        self.program.push(Instruction::AddRelation {
            relation: relation_name.to_string(),
        });
        for value in values {
            self.program.push(Instruction::AddArgument { value });
        }
        Some(())
    }

    fn parse_update(&mut self, relation_name: &str) -> Option<()> {
        self.expect_separator("(")?;
        self.expect_separator(")")?;

        self.skip_eols();
        let where_expression = self.parse_where_clause(relation_name)?;
        self.skip_eols();
        let set_expression = self.parse_set_clause(relation_name)?;
        self.expect_eol()?;

        self.program.push(Instruction::UpdateRelation {
            relation: relation_name.to_string(),
        });
        self.program.push(Instruction::Where {
            expression: where_expression,
        });
        self.program.push(Instruction::Set {
            expression: set_expression,
        });
        Some(())
    }

    fn parse_delete(&mut self, relation_name: &str) -> Option<()> {
        self.expect_separator("(")?;
        self.expect_separator(")")?;

        self.skip_eols();
        let where_expression = self.parse_where_clause(relation_name)?;
        self.expect_eol()?;

        self.program.push(Instruction::DeleteRelation {
            relation: relation_name.to_string(),
        });
        self.program.push(Instruction::Where {
            expression: where_expression,
        });
        Some(())
    }

    /// `where { ... }`: validate the predicate against the relation and
    /// return its source text for the instruction stream.
    fn parse_where_clause(&mut self, relation_name: &str) -> Option<String> {
        let line = self.line();
        if !self.current().is_some_and(|t| t.is_keyword("where")) {
            let found = self.describe_current();
            self.error_here(format!("expected 'where', found {}", found));
            return None;
        }
        self.position += 1;

        let tokens = self.collect_braced_tokens()?;
        let relation = &self.relations[relation_name].relation;

        let expr_result = predicate::parse_expression(&tokens, relation);
        if let Err(message) = expr_result {
            self.error(line, format!("invalid where clause: {}", message));
            return None;
        }

        let clauses = match predicate::compile_clauses(&tokens) {
            Ok(clauses) => clauses,
            Err(message) => {
                self.error(line, format!("invalid where clause: {}", message));
                return None;
            }
        };

        if let Ok((_, pk)) = relation.primary_key() {
            if predicate::pk_conjoined_with_extras(&clauses, &pk.name) {
                self.diagnostics.warning(
                    line,
                    format!(
                        "predicates beside the PK equality on '{}' are redundant",
                        pk.name
                    ),
                );
            }
        }

        Some(render_tokens(&tokens))
    }

    /// `set { attr = lit, ... }`: validate assignments and return source text.
    fn parse_set_clause(&mut self, relation_name: &str) -> Option<String> {
        let line = self.line();
        if !self.current().is_some_and(|t| t.is_keyword("set")) {
            let found = self.describe_current();
            self.error_here(format!("expected 'set', found {}", found));
            return None;
        }
        self.position += 1;

        let tokens = self.collect_braced_tokens()?;
        let relation = &self.relations[relation_name].relation;

        if let Err(message) = predicate::parse_assignments(&tokens, relation) {
            self.error(line, format!("invalid set clause: {}", message));
            return None;
        }

        Some(render_tokens(&tokens))
    }

    /// Consume `{ tokens... }` and return the inner tokens. End-of-line
    /// markers inside the braces are tolerated and dropped.
    fn collect_braced_tokens(&mut self) -> Option<Vec<Token>> {
        self.expect_separator("{")?;

        let mut tokens = Vec::new();
        loop {
            match self.current() {
                Some(token) if token.is_separator("}") => {
                    self.position += 1;
                    return Some(tokens);
                }
                Some(token) if token.is_eol() => {
                    self.position += 1;
                }
                Some(token) => {
                    tokens.push(token.clone());
                    self.position += 1;
                }
                None => {
                    self.error_here("expected '}' before end of input");
                    return None;
                }
            }
        }
    }

    // ========== let arr = Rel.fetch(...) ==========

    fn parse_let(&mut self) -> Option<()> {
        let line = self.line();
        self.advance();
        let array_name = self.expect_identifier("an array name")?;
        self.expect_separator("=")?;
        let relation_name = self.expect_identifier("a relation name")?;
        self.expect_separator(".")?;

        let is_fetch = self
            .current()
            .is_some_and(|t| t.kind == TokenKind::Method && t.lexeme == "fetch");
        if !is_fetch {
            let found = self.describe_current();
            self.error_here(format!("expected 'fetch', found {}", found));
            return None;
        }
        self.position += 1;

        if !self.relations.contains_key(&relation_name) {
            self.error(
                line,
                format!("relation '{}' was not declared", relation_name),
            );
            return None;
        }
        if self.arrays.contains_key(&array_name) {
            self.error(line, format!("array '{}' was already declared", array_name));
            return None;
        }
        self.used_relations.insert(relation_name.clone());

        self.expect_separator("(")?;
        let mut instructions = vec![
            Instruction::Array {
                name: array_name.clone(),
            },
            Instruction::FetchRelation {
                relation: relation_name.clone(),
            },
        ];

        loop {
            self.parse_fetch_chain(&relation_name, &mut instructions)?;
            if self.current().is_some_and(|t| t.is_separator(",")) {
                self.position += 1;
                continue;
            }
            break;
        }
        self.expect_separator(")")?;

        // Optional filter, on the same line as the call.
        if self.current().is_some_and(|t| t.is_keyword("where")) {
            let expression = self.parse_where_clause(&relation_name)?;
            instructions.push(Instruction::Where { expression });
        }
        self.expect_eol()?;

        self.arrays.insert(array_name, line);
        for instruction in instructions {
            self.program.push(instruction);
        }
        Some(())
    }

    /// One fetch argument: attribute names and string literals joined by
    /// `+`. Attributes lower to `fetchAttribute`, literals to `concatenate`.
    fn parse_fetch_chain(
        &mut self,
        relation_name: &str,
        instructions: &mut Vec<Instruction>,
    ) -> Option<()> {
        loop {
            match self.current() {
                Some(token) if token.is_identifier() => {
                    let attribute = token.lexeme.clone();
                    let line = token.line;
                    if !self.relations[relation_name].relation.has_attribute(&attribute) {
                        self.error(
                            line,
                            format!(
                                "'{}' is not an attribute of relation '{}'",
                                attribute, relation_name
                            ),
                        );
                        return None;
                    }
                    instructions.push(Instruction::FetchAttribute { attribute });
                    self.position += 1;
                }
                Some(token) if token.is_constant() => {
                    instructions.push(Instruction::Concatenate {
                        operand: token.unquoted(),
                    });
                    self.position += 1;
                }
                _ => {
                    let found = self.describe_current();
                    self.error_here(format!(
                        "expected an attribute or constant, found {}",
                        found
                    ));
                    return None;
                }
            }

            if self.current().is_some_and(|t| t.is_separator("+")) {
                self.position += 1;
                continue;
            }
            return Some(());
        }
    }

    // ========== show : Name ==========

    fn parse_show(&mut self) -> Option<()> {
        let line = self.line();
        self.advance();
        self.expect_separator(":")?;
        let name = self.expect_identifier("a schema, relation, or array name")?;
        self.expect_eol()?;

        if self.schemas.contains(&name) {
            self.program.push(Instruction::ShowSchema { schema: name });
        } else if self.relations.contains_key(&name) {
            self.program.push(Instruction::Show { relation: name });
        } else if self.arrays.contains_key(&name) {
            self.shown_arrays.insert(name.clone());
            self.program.push(Instruction::ShowArray { array: name });
        } else {
            self.error(
                line,
                format!("'{}' is not a declared schema, relation, or array", name),
            );
        }
        Some(())
    }

    // ========== Deferred warnings ==========

    fn report_unused(&mut self) {
        let mut unused: Vec<(usize, String)> = Vec::new();
        for (name, entry) in &self.relations {
            if !self.used_relations.contains(name) {
                unused.push((
                    entry.line,
                    format!("relation '{}' is declared but never used", name),
                ));
            }
        }
        for (name, line) in &self.arrays {
            if !self.shown_arrays.contains(name) {
                unused.push((*line, format!("array '{}' is never shown", name)));
            }
        }
        for (line, message) in unused {
            self.diagnostics.warning(line, message);
        }
        if self.diagnostics.has_errors() {
            debug!(errors = self.diagnostics.error_count(), "compilation failed");
        }
    }
}

/// Rebuild expression source text from tokens for the instruction stream.
/// String constants keep their quotes so re-tokenizing round-trips.
fn render_tokens(tokens: &[Token]) -> String {
    let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
    lexemes.join(" ")
}
