//! Schema definitions for FlatDB
//!
//! This module defines schemas, relations, attributes, and the column
//! constraints attached to attributes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::DataType;
use crate::error::{Error, Result};

/// Column constraint on an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constraint {
    PrimaryKey,
    ForeignKey,
    Nullable,
    NotNull,
}

impl Constraint {
    /// Parse the serialized form used by the attribute registry and the
    /// instruction stream.
    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "PK" => Ok(Constraint::PrimaryKey),
            "FK" => Ok(Constraint::ForeignKey),
            "NULLABLE" => Ok(Constraint::Nullable),
            "NOT NULL" => Ok(Constraint::NotNull),
            _ => Err(Error::UnknownConstraint(text.to_string())),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::PrimaryKey => write!(f, "PK"),
            Constraint::ForeignKey => write!(f, "FK"),
            Constraint::Nullable => write!(f, "NULLABLE"),
            Constraint::NotNull => write!(f, "NOT NULL"),
        }
    }
}

/// One column of a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub data_type: DataType,
    pub constraint: Constraint,
}

impl Attribute {
    pub fn new(name: impl Into<String>, data_type: DataType, constraint: Constraint) -> Self {
        Self {
            name: name.into(),
            data_type,
            constraint,
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.constraint == Constraint::PrimaryKey
    }
}

/// A relation (table). Attribute order is significant: it fixes the column
/// position in the row file and the argument order of `add`/`fetch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    name: String,
    attributes: Vec<Attribute>,
}

impl Relation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute(name).is_some()
    }

    /// Position of `name` in the on-disk row, counting the leading RID field.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|a| a.name == name)
            .map(|i| i + 1)
    }

    /// The attribute carrying the `PK` constraint, with its zero-based
    /// position among the attributes (not counting the RID field).
    pub fn primary_key(&self) -> Result<(usize, &Attribute)> {
        self.attributes
            .iter()
            .enumerate()
            .find(|(_, a)| a.is_primary_key())
            .ok_or_else(|| Error::MissingPrimaryKey(self.name.clone()))
    }

    /// Header line of the relation file: `RID,<attr1>,<attr2>,...`
    pub fn header(&self) -> String {
        let mut header = String::from("RID");
        for attribute in &self.attributes {
            header.push(',');
            header.push_str(&attribute.name);
        }
        header
    }
}

/// A schema owning a set of relations, unique by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    relations: Vec<String>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_relation(&mut self, relation_name: impl Into<String>) {
        let relation_name = relation_name.into();
        if !self.relations.contains(&relation_name) {
            self.relations.push(relation_name);
        }
    }

    pub fn relations(&self) -> &[String] {
        &self.relations
    }

    pub fn owns(&self, relation_name: &str) -> bool {
        self.relations.iter().any(|r| r == relation_name)
    }
}
