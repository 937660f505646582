//! Storage engine module
//!
//! This module contains the storage engine components:
//! - Line-oriented file primitives
//! - On-disk catalog layout
//! - B-tree primary-key index

pub mod btree;
pub mod files;
pub mod layout;

pub use btree::BTree;
pub use layout::{Layout, DEFAULT_DB_ROOT};
