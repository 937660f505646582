//! Catalog module
//!
//! This module contains the in-memory catalog, schema definitions, and data types.

pub mod catalog;
pub mod schema;
pub mod types;

pub use catalog::Catalog;
pub use schema::{Attribute, Constraint, Relation, Schema};
pub use types::DataType;
