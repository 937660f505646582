//! In-memory catalog for FlatDB
//!
//! The catalog is the executor-owned registry of schemas and relations for
//! one run. It is populated lazily as instructions execute and extended from
//! the on-disk attribute registry when a relation is referenced again in a
//! later run without being redeclared.

use indexmap::IndexMap;

use super::schema::{Relation, Schema};
use crate::error::{Error, Result};

/// Registry of schemas and relations known to the current executor run.
///
/// Relations are kept in a flat map alongside the schema registry so method
/// calls can resolve a relation without knowing its owning schema. Insertion
/// order is preserved; it mirrors declaration order in the program.
#[derive(Debug, Default)]
pub struct Catalog {
    schemas: IndexMap<String, Schema>,
    relations: IndexMap<String, Relation>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema. Re-registering an existing name is a no-op: the
    /// compiler already rejected duplicate declarations, so a second
    /// `createSchema` can only come from re-running a program.
    pub fn add_schema(&mut self, schema: Schema) {
        self.schemas.entry(schema.name().to_string()).or_insert(schema);
    }

    pub fn get_schema(&self, name: &str) -> Result<&Schema> {
        self.schemas
            .get(name)
            .ok_or_else(|| Error::SchemaNotFound(name.to_string()))
    }

    pub fn get_schema_mut(&mut self, name: &str) -> Result<&mut Schema> {
        self.schemas
            .get_mut(name)
            .ok_or_else(|| Error::SchemaNotFound(name.to_string()))
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Register a relation under its owning schema.
    pub fn add_relation(&mut self, schema_name: &str, relation: Relation) -> Result<()> {
        let schema = self
            .schemas
            .get_mut(schema_name)
            .ok_or_else(|| Error::SchemaNotFound(schema_name.to_string()))?;
        schema.add_relation(relation.name());
        self.relations
            .entry(relation.name().to_string())
            .or_insert(relation);
        Ok(())
    }

    pub fn get_relation(&self, name: &str) -> Result<&Relation> {
        self.relations
            .get(name)
            .ok_or_else(|| Error::RelationNotFound(name.to_string()))
    }

    pub fn get_relation_mut(&mut self, name: &str) -> Result<&mut Relation> {
        self.relations
            .get_mut(name)
            .ok_or_else(|| Error::RelationNotFound(name.to_string()))
    }

    pub fn has_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// The schema owning `relation_name`.
    pub fn schema_of(&self, relation_name: &str) -> Result<&Schema> {
        self.schemas
            .values()
            .find(|s| s.owns(relation_name))
            .ok_or_else(|| Error::RelationNotFound(relation_name.to_string()))
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.values()
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::{Attribute, Constraint};
    use crate::catalog::types::DataType;

    fn catalog_with_student() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add_schema(Schema::new("University"));

        let mut relation = Relation::new("Student");
        relation.add_attribute(Attribute::new("id", DataType::Integer, Constraint::PrimaryKey));
        catalog.add_relation("University", relation).unwrap();
        catalog
    }

    #[test]
    fn test_relation_lookup() {
        let catalog = catalog_with_student();
        assert!(catalog.has_relation("Student"));
        assert_eq!(catalog.get_relation("Student").unwrap().name(), "Student");
        assert!(matches!(
            catalog.get_relation("Course"),
            Err(Error::RelationNotFound(_))
        ));
    }

    #[test]
    fn test_relation_requires_schema() {
        let mut catalog = Catalog::new();
        let result = catalog.add_relation("Nowhere", Relation::new("Student"));
        assert!(matches!(result, Err(Error::SchemaNotFound(_))));
    }

    #[test]
    fn test_schema_of() {
        let catalog = catalog_with_student();
        assert_eq!(catalog.schema_of("Student").unwrap().name(), "University");
        assert!(catalog.schema_of("Course").is_err());
    }

    #[test]
    fn test_re_registration_is_idempotent() {
        let mut catalog = catalog_with_student();
        catalog.add_schema(Schema::new("University"));
        catalog
            .add_relation("University", Relation::new("Student"))
            .unwrap();

        // The original relation keeps its attributes.
        assert_eq!(catalog.get_relation("Student").unwrap().attribute_count(), 1);
        assert_eq!(catalog.schemas().count(), 1);
    }
}
