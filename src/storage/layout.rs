//! On-disk catalog layout
//!
//! Path conventions for the database tree:
//!
//! ```text
//! <root>/<schema>/currentRID            lines "<relation>:<nextRID>"
//! <root>/<schema>/relationAttributes    "Relation,<name>" header followed by
//!                                       "<attr>,<dataType>,<constraint>" lines
//! <root>/<schema>/relations/<relation>  line 0 "RID,<attr1>,..." then row lines
//! ```

use std::path::{Path, PathBuf};

/// Default database root used by the CLI.
pub const DEFAULT_DB_ROOT: &str = "DB";

pub const RID_COUNTER_FILE: &str = "currentRID";
pub const ATTRIBUTE_REGISTRY_FILE: &str = "relationAttributes";
pub const RELATIONS_DIR: &str = "relations";

/// Resolves every persisted path under one database root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn schema_dir(&self, schema: &str) -> PathBuf {
        self.root.join(schema)
    }

    pub fn relations_dir(&self, schema: &str) -> PathBuf {
        self.schema_dir(schema).join(RELATIONS_DIR)
    }

    pub fn rid_counter(&self, schema: &str) -> PathBuf {
        self.schema_dir(schema).join(RID_COUNTER_FILE)
    }

    pub fn attribute_registry(&self, schema: &str) -> PathBuf {
        self.schema_dir(schema).join(ATTRIBUTE_REGISTRY_FILE)
    }

    pub fn relation_file(&self, schema: &str, relation: &str) -> PathBuf {
        self.relations_dir(schema).join(relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = Layout::new("DB");
        assert_eq!(layout.schema_dir("S"), PathBuf::from("DB/S"));
        assert_eq!(layout.rid_counter("S"), PathBuf::from("DB/S/currentRID"));
        assert_eq!(
            layout.attribute_registry("S"),
            PathBuf::from("DB/S/relationAttributes")
        );
        assert_eq!(
            layout.relation_file("S", "R"),
            PathBuf::from("DB/S/relations/R")
        );
    }
}
