//! Predicate compiler and evaluator
//!
//! `where` and `set` clauses arrive as token streams. This module validates
//! them against a relation's attributes (structure and literal types),
//! builds an owned expression tree for evaluation, and independently
//! flattens the token stream into disjunctive normal form: an OR of
//! AND-clauses of atomic `attribute OP literal` comparisons.
//!
//! A predicate consisting of exactly one primary-key equality is the fast
//! path: the executor resolves it through the PK index instead of scanning
//! the relation file.

use std::collections::HashMap;

use super::scanner;
use super::token::{Token, TokenKind};
use crate::catalog::Relation;

/// Comparison operators usable in predicates. `=` and `==` both mean
/// equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl CompareOp {
    pub fn parse(lexeme: &str) -> Option<Self> {
        match lexeme {
            "==" | "=" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Neq),
            ">" => Some(CompareOp::Gt),
            "<" => Some(CompareOp::Lt),
            ">=" => Some(CompareOp::Gte),
            "<=" => Some(CompareOp::Lte),
            _ => None,
        }
    }

    /// Compare two field values. Values that both parse as integers are
    /// compared numerically, everything else lexicographically.
    pub fn compare(&self, left: &str, right: &str) -> bool {
        let ordering = match (left.parse::<i64>(), right.parse::<i64>()) {
            (Ok(l), Ok(r)) => l.cmp(&r),
            _ => left.cmp(right),
        };

        match self {
            CompareOp::Eq => ordering.is_eq(),
            CompareOp::Neq => ordering.is_ne(),
            CompareOp::Gt => ordering.is_gt(),
            CompareOp::Lt => ordering.is_lt(),
            CompareOp::Gte => ordering.is_ge(),
            CompareOp::Lte => ordering.is_le(),
        }
    }
}

/// One atomic comparison. The literal is stored unquoted.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub attribute: String,
    pub op: CompareOp,
    pub literal: String,
}

impl Comparison {
    pub fn matches(&self, row: &HashMap<String, String>) -> bool {
        match row.get(&self.attribute) {
            Some(value) => self.op.compare(value, &self.literal),
            None => false,
        }
    }
}

/// A conjunction of comparisons: every one must hold.
#[derive(Debug, Clone, PartialEq)]
pub struct ClauseSet {
    pub comparisons: Vec<Comparison>,
}

impl ClauseSet {
    pub fn matches(&self, row: &HashMap<String, String>) -> bool {
        self.comparisons.iter().all(|c| c.matches(row))
    }
}

/// Validated expression tree, evaluated directly for tests and kept as the
/// reference semantics for the flattened clause form.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare(Comparison),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn evaluate(&self, row: &HashMap<String, String>) -> bool {
        match self {
            Expr::Compare(comparison) => comparison.matches(row),
            Expr::And(left, right) => left.evaluate(row) && right.evaluate(row),
            Expr::Or(left, right) => left.evaluate(row) || right.evaluate(row),
        }
    }
}

/// Tokenize a stored expression (the payload of a `where:`/`set:`
/// instruction) back into tokens, without the trailing end-of-line marker.
pub fn tokenize_expression(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    scanner::tokenize_line(text, 0, &mut tokens);
    while tokens.last().is_some_and(|t| t.is_eol()) {
        tokens.pop();
    }
    tokens
}

/// Parse and validate a `where` expression against `relation`'s attributes.
///
/// Grammar: OR of AND-chains of atomic comparisons, parentheses allowed
/// around an atom. Every identifier must name an attribute, and every
/// literal must fit the datatype of the attribute it is compared to.
pub fn parse_expression(tokens: &[Token], relation: &Relation) -> Result<Expr, String> {
    let mut parser = ExprParser { tokens, position: 0 };
    let expr = parser.parse_or(relation)?;
    if parser.position != tokens.len() {
        return Err(format!(
            "unexpected '{}' after end of expression",
            parser.tokens[parser.position].lexeme
        ));
    }
    Ok(expr)
}

/// Structural and semantic validation of a `where` token stream.
pub fn validate(tokens: &[Token], relation: &Relation) -> bool {
    parse_expression(tokens, relation).is_ok()
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    position: usize,
}

impl<'a> ExprParser<'a> {
    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn eat_separator(&mut self, separator: &str) -> bool {
        if self.current().is_some_and(|t| t.is_separator(separator)) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self, relation: &Relation) -> Result<Expr, String> {
        let mut expr = self.parse_and(relation)?;
        while self.eat_separator("or") {
            let right = self.parse_and(relation)?;
            expr = Expr::Or(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_and(&mut self, relation: &Relation) -> Result<Expr, String> {
        let mut expr = self.parse_atom(relation)?;
        while self.eat_separator("and") {
            let right = self.parse_atom(relation)?;
            expr = Expr::And(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_atom(&mut self, relation: &Relation) -> Result<Expr, String> {
        if self.eat_separator("(") {
            let expr = self.parse_comparison(relation)?;
            if !self.eat_separator(")") {
                return Err("expected ')' to match '('".to_string());
            }
            return Ok(expr);
        }
        self.parse_comparison(relation)
    }

    fn parse_comparison(&mut self, relation: &Relation) -> Result<Expr, String> {
        let attribute = match self.current() {
            Some(token) if token.is_identifier() => token.lexeme.clone(),
            Some(token) => return Err(format!("expected an attribute name, found '{}'", token.lexeme)),
            None => return Err("expected an attribute name".to_string()),
        };
        self.position += 1;

        let Some(found) = relation.get_attribute(&attribute) else {
            return Err(format!(
                "'{}' is not an attribute of relation '{}'",
                attribute,
                relation.name()
            ));
        };

        let op = match self.current() {
            Some(token) if token.kind == TokenKind::Separator => {
                match CompareOp::parse(&token.lexeme) {
                    Some(op) => op,
                    None => {
                        return Err(format!("'{}' is not a comparison operator", token.lexeme))
                    }
                }
            }
            Some(token) => return Err(format!("expected an operator, found '{}'", token.lexeme)),
            None => return Err("expected a comparison operator".to_string()),
        };
        self.position += 1;

        let literal = match self.current() {
            Some(token) if token.is_constant() => token.unquoted(),
            Some(token) => return Err(format!("expected a constant, found '{}'", token.lexeme)),
            None => return Err("expected a constant".to_string()),
        };
        self.position += 1;

        if !found.data_type.validate(&literal) {
            return Err(format!(
                "'{}' is not a valid {} for attribute '{}'",
                literal, found.data_type, attribute
            ));
        }

        Ok(Expr::Compare(Comparison {
            attribute,
            op,
            literal,
        }))
    }
}

/// Flatten a validated token stream into DNF clause sets.
///
/// This is an independent pass over the tokens: clause sets split on
/// top-level `or`, conjuncts split on top-level `and`, parenthesis nesting
/// respected. String constants are single tokens, so `and`/`or` inside
/// quotes never split anything.
pub fn compile_clauses(tokens: &[Token]) -> Result<Vec<ClauseSet>, String> {
    let mut clauses = Vec::new();

    for group in split_top_level(tokens, "or")? {
        let mut comparisons = Vec::new();
        for conjunct in split_top_level(group, "and")? {
            comparisons.push(parse_flat_comparison(conjunct)?);
        }
        clauses.push(ClauseSet { comparisons });
    }

    Ok(clauses)
}

fn split_top_level<'a>(
    tokens: &'a [Token],
    separator: &str,
) -> Result<Vec<&'a [Token]>, String> {
    let mut groups = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;

    for (index, token) in tokens.iter().enumerate() {
        if token.is_separator("(") {
            depth += 1;
        } else if token.is_separator(")") {
            depth -= 1;
            if depth < 0 {
                return Err("unbalanced ')'".to_string());
            }
        } else if depth == 0 && token.is_separator(separator) {
            groups.push(&tokens[start..index]);
            start = index + 1;
        }
    }

    if depth != 0 {
        return Err("unbalanced '('".to_string());
    }
    groups.push(&tokens[start..]);
    Ok(groups)
}

/// A conjunct is `attribute OP literal`, optionally wrapped in parentheses
/// which are dropped on output.
fn parse_flat_comparison(tokens: &[Token]) -> Result<Comparison, String> {
    let mut tokens = tokens;
    while tokens.len() >= 2
        && tokens.first().is_some_and(|t| t.is_separator("("))
        && tokens.last().is_some_and(|t| t.is_separator(")"))
    {
        tokens = &tokens[1..tokens.len() - 1];
    }

    match tokens {
        [attribute, op, literal] if attribute.is_identifier() && literal.is_constant() => {
            let op = CompareOp::parse(&op.lexeme)
                .ok_or_else(|| format!("'{}' is not a comparison operator", op.lexeme))?;
            Ok(Comparison {
                attribute: attribute.lexeme.clone(),
                op,
                literal: literal.unquoted(),
            })
        }
        _ => Err("expected 'attribute OP constant'".to_string()),
    }
}

/// Fast-path check: the whole predicate is a single equality on the primary
/// key, with no disjunction and no other conjuncts.
pub fn is_pk_queried(clauses: &[ClauseSet], pk_attribute: &str) -> bool {
    match clauses {
        [clause] => match clause.comparisons.as_slice() {
            [comparison] => {
                comparison.attribute == pk_attribute && comparison.op == CompareOp::Eq
            }
            _ => false,
        },
        _ => false,
    }
}

/// Operator and literal of the fast-path PK equality.
pub fn pk_query_information<'a>(
    clauses: &'a [ClauseSet],
    pk_attribute: &str,
) -> Option<(CompareOp, &'a str)> {
    if !is_pk_queried(clauses, pk_attribute) {
        return None;
    }
    let comparison = &clauses[0].comparisons[0];
    Some((comparison.op, comparison.literal.as_str()))
}

/// True when some clause set combines a PK equality with further
/// comparisons; those extra conjuncts are redundant since the key already
/// pins down the row.
pub fn pk_conjoined_with_extras(clauses: &[ClauseSet], pk_attribute: &str) -> bool {
    clauses.iter().any(|clause| {
        clause.comparisons.len() > 1
            && clause
                .comparisons
                .iter()
                .any(|c| c.attribute == pk_attribute && c.op == CompareOp::Eq)
    })
}

/// Parse and validate a `set { attr = literal, ... }` token stream into
/// assignment pairs (literal unquoted).
pub fn parse_assignments(
    tokens: &[Token],
    relation: &Relation,
) -> Result<Vec<(String, String)>, String> {
    let mut assignments = Vec::new();

    for group in split_on_comma(tokens) {
        match group {
            [attribute, eq, literal]
                if attribute.is_identifier()
                    && (eq.is_separator("=") || eq.is_separator("=="))
                    && literal.is_constant() =>
            {
                let Some(found) = relation.get_attribute(&attribute.lexeme) else {
                    return Err(format!(
                        "'{}' is not an attribute of relation '{}'",
                        attribute.lexeme,
                        relation.name()
                    ));
                };
                let value = literal.unquoted();
                if !found.data_type.validate(&value) {
                    return Err(format!(
                        "'{}' is not a valid {} for attribute '{}'",
                        value, found.data_type, attribute.lexeme
                    ));
                }
                assignments.push((attribute.lexeme.clone(), value));
            }
            _ => return Err("expected 'attribute = constant'".to_string()),
        }
    }

    if assignments.is_empty() {
        return Err("empty set clause".to_string());
    }
    Ok(assignments)
}

fn split_on_comma(tokens: &[Token]) -> Vec<&[Token]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for (index, token) in tokens.iter().enumerate() {
        if token.is_separator(",") {
            groups.push(&tokens[start..index]);
            start = index + 1;
        }
    }
    groups.push(&tokens[start..]);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Attribute, Constraint, DataType};

    fn student() -> Relation {
        let mut relation = Relation::new("Student");
        relation.add_attribute(Attribute::new("id", DataType::Integer, Constraint::PrimaryKey));
        relation.add_attribute(Attribute::new(
            "name",
            DataType::Varchar(20),
            Constraint::NotNull,
        ));
        relation.add_attribute(Attribute::new("age", DataType::Integer, Constraint::Nullable));
        relation
    }

    fn row(fields: &[(&str, &str)]) -> HashMap<String, String> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let relation = student();
        for text in [
            "id == 1",
            "id = 1",
            "age >= 18 and name != \"Bob\"",
            "(id == 1) or (age < 10)",
            "id == 1 or age > 30 and name == \"Ann\"",
        ] {
            let tokens = tokenize_expression(text);
            assert!(validate(&tokens, &relation), "rejected: {}", text);
        }
    }

    #[test]
    fn test_validate_rejects_malformed() {
        let relation = student();
        for text in [
            "",
            "id ==",
            "== 1",
            "id == 1 and",
            "id == == 1",
            "(id == 1",
            "id == 1)",
            "height == 3",        // unknown attribute
            "age == \"x\"",       // type mismatch
            "name == \"this name is far too long for twenty\"",
            "id 1",
        ] {
            let tokens = tokenize_expression(text);
            assert!(!validate(&tokens, &relation), "accepted: {}", text);
        }
    }

    #[test]
    fn test_clause_extraction_groups_by_or_then_and() {
        let tokens = tokenize_expression("id == 1 and age > 2 or name == \"Ann\"");
        let clauses = compile_clauses(&tokens).unwrap();

        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].comparisons.len(), 2);
        assert_eq!(clauses[1].comparisons.len(), 1);
        assert_eq!(clauses[1].comparisons[0].attribute, "name");
        assert_eq!(clauses[1].comparisons[0].literal, "Ann");
    }

    #[test]
    fn test_clause_extraction_flattens_parens() {
        let tokens = tokenize_expression("(id == 1) and (age > 2)");
        let clauses = compile_clauses(&tokens).unwrap();
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].comparisons.len(), 2);
    }

    #[test]
    fn test_and_inside_string_does_not_split() {
        let tokens = tokenize_expression("name == \"rock and roll\" or id == 2");
        let clauses = compile_clauses(&tokens).unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].comparisons[0].literal, "rock and roll");
    }

    #[test]
    fn test_tree_and_clauses_agree() {
        let relation = student();
        let expressions = [
            "id == 1",
            "age >= 18 and age <= 30",
            "id == 1 or id == 2",
            "age > 20 and name != \"Ann\" or id == 3",
            "(id == 2) or (age < 25 and name == \"Bob\")",
        ];
        let rows = [
            row(&[("id", "1"), ("name", "Ann"), ("age", "22")]),
            row(&[("id", "2"), ("name", "Bob"), ("age", "17")]),
            row(&[("id", "3"), ("name", "Cal"), ("age", "40")]),
            row(&[("id", "9"), ("name", "Dee"), ("age", "9")]),
        ];

        for text in expressions {
            let tokens = tokenize_expression(text);
            let tree = parse_expression(&tokens, &relation).unwrap();
            let clauses = compile_clauses(&tokens).unwrap();

            for row in &rows {
                let by_tree = tree.evaluate(row);
                let by_clauses = clauses.iter().any(|c| c.matches(row));
                assert_eq!(by_tree, by_clauses, "disagree on '{}' for {:?}", text, row);
            }
        }
    }

    #[test]
    fn test_numeric_comparison() {
        let comparison = Comparison {
            attribute: "age".to_string(),
            op: CompareOp::Gt,
            literal: "9".to_string(),
        };
        // "10" > "9" numerically even though it sorts lower as a string.
        assert!(comparison.matches(&row(&[("age", "10")])));
    }

    #[test]
    fn test_pk_fast_path_detection() {
        let clauses = compile_clauses(&tokenize_expression("id == 7")).unwrap();
        assert!(is_pk_queried(&clauses, "id"));
        let (op, literal) = pk_query_information(&clauses, "id").unwrap();
        assert_eq!(op, CompareOp::Eq);
        assert_eq!(literal, "7");

        // Inequality is not the fast path.
        let clauses = compile_clauses(&tokenize_expression("id > 7")).unwrap();
        assert!(!is_pk_queried(&clauses, "id"));

        // Disjunction is not the fast path.
        let clauses = compile_clauses(&tokenize_expression("id == 7 or id == 8")).unwrap();
        assert!(!is_pk_queried(&clauses, "id"));

        // Extra conjuncts are not the fast path, but are flagged redundant.
        let clauses = compile_clauses(&tokenize_expression("id == 7 and age > 1")).unwrap();
        assert!(!is_pk_queried(&clauses, "id"));
        assert!(pk_conjoined_with_extras(&clauses, "id"));
    }

    #[test]
    fn test_parse_assignments() {
        let relation = student();
        let tokens = tokenize_expression("name = \"Carol\", age = 21");
        let assignments = parse_assignments(&tokens, &relation).unwrap();
        assert_eq!(
            assignments,
            vec![
                ("name".to_string(), "Carol".to_string()),
                ("age".to_string(), "21".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_assignments_rejects_bad_input() {
        let relation = student();
        for text in ["", "name =", "height = 3", "age = \"x\"", "name == 1 == 2"] {
            let tokens = tokenize_expression(text);
            assert!(parse_assignments(&tokens, &relation).is_err(), "accepted: {}", text);
        }
    }
}
