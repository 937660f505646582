//! Instruction executor for FlatDB
//!
//! Interprets a compiled program against the on-disk catalog. All run state
//! (catalog, PK indexes, PK-to-row caches, result arrays) lives in one
//! `Executor` value scoped to a single invocation; everything durable is
//! read from and written back to the `DB/` tree as instructions execute.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::render;
use crate::catalog::{Attribute, Catalog, Relation, Schema};
use crate::error::{Error, Result};
use crate::lang::predicate::{self, ClauseSet};
use crate::lang::program::{Instruction, Program};
use crate::storage::files;
use crate::storage::{BTree, Layout};

/// Marker line prefix separating relations in the attribute registry.
const REGISTRY_RELATION_PREFIX: &str = "Relation,";

/// One executor run: in-memory catalog plus the per-relation runtime state.
pub struct Executor {
    layout: Layout,
    catalog: Catalog,
    /// Primary-key index per relation, built lazily from the relation file.
    indexes: HashMap<String, BTree<String>>,
    /// PK value to full row text, for O(1) payload retrieval after an
    /// index hit.
    row_cache: HashMap<String, HashMap<String, String>>,
    /// Named result arrays from `let`/`fetch`, columns in fetch order.
    arrays: IndexMap<String, Vec<Vec<String>>>,
}

impl Executor {
    pub fn new(db_root: impl Into<PathBuf>) -> Self {
        Self {
            layout: Layout::new(db_root),
            catalog: Catalog::new(),
            indexes: HashMap::new(),
            row_cache: HashMap::new(),
            arrays: IndexMap::new(),
        }
    }

    /// Load and run a program file.
    pub fn execute_file(&mut self, program_path: impl AsRef<Path>) -> Result<()> {
        let program = Program::load(program_path)?;
        self.execute(&program)
    }

    /// Run every instruction in order. Block-shaped instructions consume
    /// their follow-up lines, so the pointer advances non-uniformly.
    pub fn execute(&mut self, program: &Program) -> Result<()> {
        let instructions = program.instructions();
        let mut pointer = 0;

        while pointer < instructions.len() {
            debug!("executing instruction {} at {}", instructions[pointer], pointer);
            pointer = match &instructions[pointer] {
                Instruction::CreateSchema { schema } => self.execute_create_schema(schema, pointer)?,
                Instruction::CreateRelation { schema, relation } => {
                    self.execute_create_relation(schema, relation, pointer)?
                }
                Instruction::CreateRelationAttributes { relation } => {
                    self.execute_create_attributes(relation, instructions, pointer)?
                }
                Instruction::AddRelation { relation } => {
                    self.execute_add(relation, instructions, pointer)?
                }
                Instruction::UpdateRelation { relation } => {
                    self.execute_update(relation, instructions, pointer)?
                }
                Instruction::DeleteRelation { relation } => {
                    self.execute_delete(relation, instructions, pointer)?
                }
                Instruction::Array { name } => {
                    self.arrays.entry(name.clone()).or_default();
                    pointer + 1
                }
                Instruction::FetchRelation { relation } => {
                    self.execute_fetch(relation, instructions, pointer)?
                }
                Instruction::Show { relation } => {
                    self.execute_show(relation)?;
                    pointer + 1
                }
                Instruction::ShowSchema { schema } => {
                    self.execute_show_schema(schema)?;
                    pointer + 1
                }
                Instruction::ShowArray { array } => {
                    self.execute_show_array(array)?;
                    pointer + 1
                }
                stray => {
                    // Follow-up lines are consumed by their block header;
                    // seeing one here means the stream is malformed.
                    return Err(Error::InvariantViolation(format!(
                        "unexpected instruction '{}' outside its block",
                        stray
                    )));
                }
            };
        }

        Ok(())
    }

    /// Result array contents, columns in fetch order.
    pub fn array(&self, name: &str) -> Option<&[Vec<String>]> {
        self.arrays.get(name).map(|columns| columns.as_slice())
    }

    // ========== createSchema ==========

    /// Idempotent: directories and bookkeeping files are only created when
    /// absent, so re-running a program is harmless.
    fn execute_create_schema(&mut self, schema_name: &str, pointer: usize) -> Result<usize> {
        self.catalog.add_schema(Schema::new(schema_name));

        files::create_directory(self.layout.schema_dir(schema_name))?;
        files::create_directory(self.layout.relations_dir(schema_name))?;

        let rid_counter = self.layout.rid_counter(schema_name);
        if !files::file_exists(&rid_counter) {
            files::create_file(&rid_counter)?;
        }
        let registry = self.layout.attribute_registry(schema_name);
        if !files::file_exists(&registry) {
            files::create_file(&registry)?;
        }

        Ok(pointer + 1)
    }

    // ========== createRelation ==========

    fn execute_create_relation(
        &mut self,
        schema_name: &str,
        relation_name: &str,
        pointer: usize,
    ) -> Result<usize> {
        self.catalog.get_schema(schema_name)?;
        self.catalog
            .add_relation(schema_name, Relation::new(relation_name))?;

        // Initialize this relation's RID counter entry when absent.
        if self.read_rid_counter(schema_name, relation_name)?.is_none() {
            self.write_rid_counter(schema_name, relation_name, 0)?;
        }

        // A relation persisted by an earlier run is rebuilt from the
        // attribute registry, which also warms its PK cache and index.
        if self.registry_attributes(schema_name, relation_name)?.is_some() {
            self.load_persisted_relation(schema_name, relation_name)?;
        }

        Ok(pointer + 1)
    }

    // ========== createRelationAttributes / createAttribute ==========

    fn execute_create_attributes(
        &mut self,
        relation_name: &str,
        instructions: &[Instruction],
        pointer: usize,
    ) -> Result<usize> {
        // The attribute block is the contiguous run of createAttribute
        // lines following the header.
        let mut end = pointer + 1;
        let mut declared = Vec::new();
        while let Some(Instruction::CreateAttribute {
            name,
            data_type,
            constraint,
        }) = instructions.get(end)
        {
            declared.push(Attribute::new(name.clone(), data_type.clone(), *constraint));
            end += 1;
        }

        let schema_name = self.catalog.schema_of(relation_name)?.name().to_string();

        if self
            .registry_attributes(&schema_name, relation_name)?
            .is_some()
        {
            // Already persisted by a prior run: reconstruct from disk and
            // ignore the re-declaration.
            debug!(relation = relation_name, "reconstructing relation from registry");
            self.load_persisted_relation(&schema_name, relation_name)?;
            return Ok(end);
        }

        {
            let relation = self.catalog.get_relation_mut(relation_name)?;
            for attribute in &declared {
                relation.add_attribute(attribute.clone());
            }
        }

        // Persist the attribute block to the registry.
        let registry = self.layout.attribute_registry(&schema_name);
        files::append_line(
            &registry,
            &format!("{}{}", REGISTRY_RELATION_PREFIX, relation_name),
        )?;
        for attribute in &declared {
            files::append_line(
                &registry,
                &format!(
                    "{},{},{}",
                    attribute.name, attribute.data_type, attribute.constraint
                ),
            )?;
        }

        // Fresh relation file with just the header row.
        let relation_file = self.layout.relation_file(&schema_name, relation_name);
        let header = self.catalog.get_relation(relation_name)?.header();
        files::write_all_lines(&relation_file, &[header])?;

        self.rebuild_runtime_state(&schema_name, relation_name)?;
        Ok(end)
    }

    // ========== addRelation / addArgument ==========

    fn execute_add(
        &mut self,
        relation_name: &str,
        instructions: &[Instruction],
        pointer: usize,
    ) -> Result<usize> {
        let mut end = pointer + 1;
        let mut values = Vec::new();
        while let Some(Instruction::AddArgument { value }) = instructions.get(end) {
            values.push(value.clone());
            end += 1;
        }

        let schema_name = self.ensure_relation_loaded(relation_name)?;
        let relation = self.catalog.get_relation(relation_name)?;

        if values.len() != relation.attribute_count() {
            return Err(Error::InvariantViolation(format!(
                "add on '{}' carries {} argument(s) for {} attribute(s)",
                relation_name,
                values.len(),
                relation.attribute_count()
            )));
        }

        let (pk_position, _) = relation.primary_key()?;
        let pk_value = values[pk_position].clone();

        let duplicate = self
            .indexes
            .get(relation_name)
            .ok_or_else(|| Error::InvariantViolation(format!("no index for '{}'", relation_name)))?
            .search(&pk_value);
        if duplicate {
            warn!(relation = relation_name, key = pk_value.as_str(), "duplicate primary key");
            println!(
                "Warning: duplicate primary key '{}' in relation '{}'; row not added",
                pk_value, relation_name
            );
            return Ok(end);
        }

        let rid = self
            .read_rid_counter(&schema_name, relation_name)?
            .unwrap_or(0);

        let mut row = rid.to_string();
        for value in &values {
            row.push(',');
            row.push_str(value);
        }

        let relation_file = self.layout.relation_file(&schema_name, relation_name);
        files::append_line(&relation_file, &row)?;

        if let Some(index) = self.indexes.get_mut(relation_name) {
            index.insert(pk_value.clone());
        }
        self.row_cache
            .entry(relation_name.to_string())
            .or_default()
            .insert(pk_value, row);
        self.write_rid_counter(&schema_name, relation_name, rid + 1)?;

        Ok(end)
    }

    // ========== updateRelation / where / set ==========

    fn execute_update(
        &mut self,
        relation_name: &str,
        instructions: &[Instruction],
        pointer: usize,
    ) -> Result<usize> {
        let Some(Instruction::Where { expression }) = instructions.get(pointer + 1) else {
            return Err(Error::InvariantViolation(
                "updateRelation without a where line".to_string(),
            ));
        };
        let Some(Instruction::Set { expression: set_expression }) = instructions.get(pointer + 2)
        else {
            return Err(Error::InvariantViolation(
                "updateRelation without a set line".to_string(),
            ));
        };

        let schema_name = self.ensure_relation_loaded(relation_name)?;
        let relation = self.catalog.get_relation(relation_name)?;

        let clauses = compile_predicate(expression)?;
        let assignments = predicate::parse_assignments(
            &predicate::tokenize_expression(set_expression),
            relation,
        )
        .map_err(Error::InvalidPredicate)?;

        let (pk_position, pk_attribute) = relation.primary_key()?;
        let pk_name = pk_attribute.name.clone();
        let pk_assigned = assignments.iter().any(|(name, _)| *name == pk_name);
        let relation_file = self.layout.relation_file(&schema_name, relation_name);

        if let Some((_, key)) = predicate::pk_query_information(&clauses, &pk_name) {
            // Fast path: the index pins down at most one row.
            let key = key.to_string();
            let index_has_key = self
                .indexes
                .get(relation_name)
                .is_some_and(|index| index.search(&key));
            if !index_has_key {
                return Ok(pointer + 3);
            }

            let cached = self
                .row_cache
                .get(relation_name)
                .and_then(|cache| cache.get(&key))
                .cloned()
                .ok_or_else(|| {
                    Error::InvariantViolation(format!(
                        "PK '{}' indexed but not cached for '{}'",
                        key, relation_name
                    ))
                })?;

            let relation = self.catalog.get_relation(relation_name)?;
            let updated = apply_assignments(&cached, relation, &assignments)?;

            let mut lines = files::read_all_lines(&relation_file)?;
            if let Some(position) = lines.iter().position(|l| *l == cached) {
                lines[position] = updated.clone();
            }
            files::write_all_lines(&relation_file, &lines)?;

            let cache = self.row_cache.entry(relation_name.to_string()).or_default();
            cache.remove(&key);
            let new_key = field_at(&updated, pk_position + 1).to_string();
            cache.insert(new_key.clone(), updated);
            if pk_assigned && new_key != key {
                if let Some(index) = self.indexes.get_mut(relation_name) {
                    index.delete(&key);
                    index.insert(new_key);
                }
            }
            return Ok(pointer + 3);
        }

        // General path: scan and rewrite every matching row.
        let relation = self.catalog.get_relation(relation_name)?;
        let mut lines = files::read_all_lines(&relation_file)?;
        for line in lines.iter_mut().skip(1) {
            let row = row_values(line, relation);
            if clauses.iter().any(|clause| clause.matches(&row)) {
                *line = apply_assignments(line, relation, &assignments)?;
            }
        }
        files::write_all_lines(&relation_file, &lines)?;

        self.rebuild_runtime_state(&schema_name, relation_name)?;
        Ok(pointer + 3)
    }

    // ========== deleteRelation / where ==========

    fn execute_delete(
        &mut self,
        relation_name: &str,
        instructions: &[Instruction],
        pointer: usize,
    ) -> Result<usize> {
        let Some(Instruction::Where { expression }) = instructions.get(pointer + 1) else {
            return Err(Error::InvariantViolation(
                "deleteRelation without a where line".to_string(),
            ));
        };

        let schema_name = self.ensure_relation_loaded(relation_name)?;
        let relation = self.catalog.get_relation(relation_name)?;
        let clauses = compile_predicate(expression)?;

        let (pk_position, pk_attribute) = relation.primary_key()?;
        let pk_name = pk_attribute.name.clone();
        let relation_file = self.layout.relation_file(&schema_name, relation_name);

        if let Some((_, key)) = predicate::pk_query_information(&clauses, &pk_name) {
            let key = key.to_string();
            let index_has_key = self
                .indexes
                .get(relation_name)
                .is_some_and(|index| index.search(&key));
            if !index_has_key {
                return Ok(pointer + 2);
            }

            let cached = self
                .row_cache
                .get(relation_name)
                .and_then(|cache| cache.get(&key))
                .cloned()
                .ok_or_else(|| {
                    Error::InvariantViolation(format!(
                        "PK '{}' indexed but not cached for '{}'",
                        key, relation_name
                    ))
                })?;

            files::delete_line(&relation_file, &cached)?;
            if let Some(cache) = self.row_cache.get_mut(relation_name) {
                cache.remove(&key);
            }
            // Deleted keys leave the index too, so the key is free for a
            // later add.
            if let Some(index) = self.indexes.get_mut(relation_name) {
                index.delete(&key);
            }
            return Ok(pointer + 2);
        }

        let relation = self.catalog.get_relation(relation_name)?;
        let lines = files::read_all_lines(&relation_file)?;
        let mut kept = Vec::with_capacity(lines.len());
        let mut removed_keys = Vec::new();

        for (position, line) in lines.iter().enumerate() {
            if position == 0 {
                kept.push(line.clone());
                continue;
            }
            let row = row_values(line, relation);
            if clauses.iter().any(|clause| clause.matches(&row)) {
                removed_keys.push(field_at(line, pk_position + 1).to_string());
            } else {
                kept.push(line.clone());
            }
        }
        files::write_all_lines(&relation_file, &kept)?;

        for key in removed_keys {
            if let Some(cache) = self.row_cache.get_mut(relation_name) {
                cache.remove(&key);
            }
            if let Some(index) = self.indexes.get_mut(relation_name) {
                index.delete(&key);
            }
        }
        Ok(pointer + 2)
    }

    // ========== array / fetchRelation / fetchAttribute / concatenate ==========

    fn execute_fetch(
        &mut self,
        relation_name: &str,
        instructions: &[Instruction],
        pointer: usize,
    ) -> Result<usize> {
        let array_name = self
            .arrays
            .keys()
            .last()
            .cloned()
            .ok_or_else(|| {
                Error::InvariantViolation("fetchRelation before any array declaration".to_string())
            })?;

        // Collect this fetch block: attribute and concatenate members in
        // argument order, then an optional trailing filter.
        let mut members = Vec::new();
        let mut end = pointer + 1;
        let mut filter = None;
        loop {
            match instructions.get(end) {
                Some(Instruction::FetchAttribute { attribute }) => {
                    members.push((true, attribute.clone()));
                    end += 1;
                }
                Some(Instruction::Concatenate { operand }) => {
                    members.push((false, operand.clone()));
                    end += 1;
                }
                Some(Instruction::Where { expression }) => {
                    filter = Some(expression.clone());
                    end += 1;
                    break;
                }
                _ => break,
            }
        }

        let schema_name = self.ensure_relation_loaded(relation_name)?;
        let relation = self.catalog.get_relation(relation_name)?;
        let clauses = match &filter {
            Some(expression) => Some(compile_predicate(expression)?),
            None => None,
        };

        let relation_file = self.layout.relation_file(&schema_name, relation_name);
        let lines = files::read_all_lines(&relation_file)?;

        // Resolve the filter once, then collect each requested column from
        // the surviving rows.
        let selected: Vec<&String> = lines
            .iter()
            .skip(1)
            .filter(|line| match &clauses {
                Some(clauses) => {
                    let row = row_values(line, relation);
                    clauses.iter().any(|clause| clause.matches(&row))
                }
                None => true,
            })
            .collect();

        let mut column_slot = 0;
        for (is_attribute, text) in members {
            if is_attribute {
                let position = relation.column_position(&text).ok_or_else(|| {
                    Error::InvariantViolation(format!(
                        "fetch of unknown attribute '{}' on '{}'",
                        text, relation_name
                    ))
                })?;
                let column: Vec<String> = selected
                    .iter()
                    .map(|line| field_at(line, position).to_string())
                    .collect();

                let array = self.arrays.get_mut(&array_name).ok_or_else(|| {
                    Error::InvariantViolation(format!("array '{}' vanished", array_name))
                })?;
                match array.get_mut(column_slot) {
                    // A repeated fetch block extends the existing column,
                    // one space-joined value per matching position.
                    Some(existing) => {
                        for (position, value) in column.into_iter().enumerate() {
                            match existing.get_mut(position) {
                                Some(slot) => {
                                    slot.push(' ');
                                    slot.push_str(&value);
                                }
                                None => existing.push(value),
                            }
                        }
                    }
                    None => array.push(column),
                }
                column_slot += 1;
            } else {
                // Literal operand: appended to every value accumulated so
                // far for this array.
                let array = self.arrays.get_mut(&array_name).ok_or_else(|| {
                    Error::InvariantViolation(format!("array '{}' vanished", array_name))
                })?;
                for column in array.iter_mut() {
                    for value in column.iter_mut() {
                        value.push_str(&text);
                    }
                }
            }
        }

        Ok(end)
    }

    // ========== show / showSchema / showArray ==========

    fn execute_show(&mut self, relation_name: &str) -> Result<()> {
        let schema_name = self.ensure_relation_loaded(relation_name)?;
        let relation_file = self.layout.relation_file(&schema_name, relation_name);
        let lines = files::read_all_lines(&relation_file)?;
        print!("{}", render::render_csv_lines(&lines));
        Ok(())
    }

    fn execute_show_schema(&mut self, schema_name: &str) -> Result<()> {
        let relation_names: Vec<String> = self
            .catalog
            .get_schema(schema_name)?
            .relations()
            .to_vec();
        for relation_name in relation_names {
            println!("{}:", relation_name);
            self.execute_show(&relation_name)?;
        }
        Ok(())
    }

    fn execute_show_array(&mut self, array_name: &str) -> Result<()> {
        let columns = self.arrays.get(array_name).ok_or_else(|| {
            Error::InvariantViolation(format!("array '{}' was never filled", array_name))
        })?;

        let rows = columns.iter().map(|c| c.len()).max().unwrap_or(0);
        let header: Vec<String> = (0..columns.len())
            .map(|index| format!("{}[{}]", array_name, index))
            .collect();
        let data: Vec<Vec<String>> = (0..rows)
            .map(|row| {
                columns
                    .iter()
                    .map(|column| column.get(row).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        print!("{}", render::render(&header, &data));
        Ok(())
    }

    // ========== Relation loading & runtime state ==========

    /// Make sure `relation_name` is present in the catalog with its
    /// attributes, index, and row cache, loading from disk when the
    /// relation was declared in an earlier run. Returns the owning schema.
    fn ensure_relation_loaded(&mut self, relation_name: &str) -> Result<String> {
        if let Ok(schema) = self.catalog.schema_of(relation_name) {
            let schema_name = schema.name().to_string();
            let loaded = self
                .catalog
                .get_relation(relation_name)
                .map(|r| r.attribute_count() > 0)
                .unwrap_or(false);
            if !loaded {
                self.load_persisted_relation(&schema_name, relation_name)?;
            } else if !self.indexes.contains_key(relation_name) {
                self.rebuild_runtime_state(&schema_name, relation_name)?;
            }
            return Ok(schema_name);
        }

        // Referenced without redeclaration: find the owning schema on disk.
        if !files::dir_exists(self.layout.root()) {
            return Err(Error::RelationNotFound(relation_name.to_string()));
        }
        let schema_dirs = std::fs::read_dir(self.layout.root())?;
        for entry in schema_dirs {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let schema_name = entry.file_name().to_string_lossy().to_string();
            if self
                .registry_attributes(&schema_name, relation_name)?
                .is_some()
            {
                self.catalog.add_schema(Schema::new(&schema_name));
                self.catalog
                    .add_relation(&schema_name, Relation::new(relation_name))?;
                self.load_persisted_relation(&schema_name, relation_name)?;
                return Ok(schema_name);
            }
        }

        Err(Error::RelationNotFound(relation_name.to_string()))
    }

    /// Rebuild a persisted relation's attributes from the registry, then its
    /// index and row cache from the relation file.
    fn load_persisted_relation(&mut self, schema_name: &str, relation_name: &str) -> Result<()> {
        let attributes = self
            .registry_attributes(schema_name, relation_name)?
            .ok_or_else(|| Error::RelationNotFound(relation_name.to_string()))?;

        let relation = self.catalog.get_relation_mut(relation_name)?;
        if relation.attribute_count() == 0 {
            for attribute in attributes {
                relation.add_attribute(attribute);
            }
        }

        self.rebuild_runtime_state(schema_name, relation_name)
    }

    /// Attribute block for `relation_name` in the schema's registry file,
    /// or `None` when the relation was never persisted.
    fn registry_attributes(
        &self,
        schema_name: &str,
        relation_name: &str,
    ) -> Result<Option<Vec<Attribute>>> {
        let registry = self.layout.attribute_registry(schema_name);
        if !files::file_exists(&registry) {
            return Ok(None);
        }

        let marker = format!("{}{}", REGISTRY_RELATION_PREFIX, relation_name);
        let mut attributes = Vec::new();
        let mut in_section = false;

        for line in files::read_all_lines(&registry)? {
            if line.starts_with(REGISTRY_RELATION_PREFIX) {
                if in_section {
                    break;
                }
                in_section = line == marker;
                continue;
            }
            if !in_section {
                continue;
            }

            let mut parts = line.splitn(3, ',');
            let (Some(name), Some(data_type), Some(constraint)) =
                (parts.next(), parts.next(), parts.next())
            else {
                return Err(Error::InvariantViolation(format!(
                    "malformed registry line '{}'",
                    line
                )));
            };
            attributes.push(Attribute::new(
                name,
                crate::catalog::DataType::parse(data_type)?,
                crate::catalog::Constraint::parse(constraint)?,
            ));
        }

        if in_section || !attributes.is_empty() {
            Ok(Some(attributes))
        } else {
            Ok(None)
        }
    }

    /// Build the PK index and PK-to-row cache from the relation file.
    fn rebuild_runtime_state(&mut self, schema_name: &str, relation_name: &str) -> Result<()> {
        let relation = self.catalog.get_relation(relation_name)?;
        let (pk_position, _) = relation.primary_key()?;

        let mut index = BTree::new();
        let mut cache = HashMap::new();

        let relation_file = self.layout.relation_file(schema_name, relation_name);
        if files::file_exists(&relation_file) {
            for line in files::read_all_lines(&relation_file)?.into_iter().skip(1) {
                let key = field_at(&line, pk_position + 1).to_string();
                index.insert(key.clone());
                cache.insert(key, line);
            }
        }

        debug!(relation = relation_name, keys = index.len(), "index rebuilt");
        self.indexes.insert(relation_name.to_string(), index);
        self.row_cache.insert(relation_name.to_string(), cache);
        Ok(())
    }

    // ========== RID counter ==========

    fn read_rid_counter(&self, schema_name: &str, relation_name: &str) -> Result<Option<u64>> {
        let path = self.layout.rid_counter(schema_name);
        if !files::file_exists(&path) {
            return Ok(None);
        }

        let prefix = format!("{}:", relation_name);
        for line in files::read_all_lines(&path)? {
            if let Some(value) = line.strip_prefix(&prefix) {
                let value = value.parse::<u64>().map_err(|_| {
                    Error::InvariantViolation(format!("malformed RID counter line '{}'", line))
                })?;
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn write_rid_counter(
        &self,
        schema_name: &str,
        relation_name: &str,
        value: u64,
    ) -> Result<()> {
        let path = self.layout.rid_counter(schema_name);
        let mut lines = if files::file_exists(&path) {
            files::read_all_lines(&path)?
        } else {
            Vec::new()
        };

        let prefix = format!("{}:", relation_name);
        let entry = format!("{}:{}", relation_name, value);
        match lines.iter_mut().find(|l| l.starts_with(&prefix)) {
            Some(line) => *line = entry,
            None => lines.push(entry),
        }
        files::write_all_lines(&path, &lines)
    }
}

// ========== Row helpers ==========

/// Field at `position` of a comma-separated row (0 is the RID).
fn field_at(line: &str, position: usize) -> &str {
    line.split(',').nth(position).unwrap_or("")
}

/// Attribute name to field value for one row line.
fn row_values(line: &str, relation: &Relation) -> HashMap<String, String> {
    let fields: Vec<&str> = line.split(',').collect();
    relation
        .attributes()
        .iter()
        .enumerate()
        .map(|(position, attribute)| {
            let value = fields.get(position + 1).copied().unwrap_or("");
            (attribute.name.clone(), value.to_string())
        })
        .collect()
}

/// Apply `set` assignments to one row line, keeping the RID.
fn apply_assignments(
    line: &str,
    relation: &Relation,
    assignments: &[(String, String)],
) -> Result<String> {
    let mut fields: Vec<String> = line.split(',').map(|f| f.to_string()).collect();
    for (attribute, value) in assignments {
        let position = relation.column_position(attribute).ok_or_else(|| {
            Error::InvariantViolation(format!("set of unknown attribute '{}'", attribute))
        })?;
        if position >= fields.len() {
            return Err(Error::InvariantViolation(format!(
                "row '{}' shorter than attribute list",
                line
            )));
        }
        fields[position] = value.clone();
    }
    Ok(fields.join(","))
}

/// Tokenize and flatten a stored `where` expression.
fn compile_predicate(expression: &str) -> Result<Vec<ClauseSet>> {
    let tokens = predicate::tokenize_expression(expression);
    predicate::compile_clauses(&tokens).map_err(Error::InvalidPredicate)
}
