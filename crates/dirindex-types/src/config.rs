//! Table configuration.
//!
//! These structures can be deserialized from a JSON (or any other serde)
//! document, so that the partition layer can keep its index definitions in a
//! configuration file.  Every field except the table name has a default.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default value of [`TableConfig::duplicate_limit`].
pub const fn default_duplicate_limit() -> usize {
    512
}

/// Configuration for one index table.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table name, usually the attribute the index is built on.
    pub name: String,

    /// Whether a key may map to more than one value.
    #[serde(default)]
    pub duplicates: bool,

    /// Maximum number of values kept inline for a single key.
    ///
    /// Once a key has more than this many values, its values are moved into a
    /// secondary ordered store.  They move back inline once the count drops
    /// below half of this limit.  Must be at least 1.
    #[serde(default = "default_duplicate_limit")]
    pub duplicate_limit: usize,

    /// Cache size requested from the secondary store backend, in entries.
    #[serde(default)]
    pub cache_size: Option<usize>,

    /// Working directory for the secondary store backend.
    #[serde(default)]
    pub working_directory: Option<String>,
}

impl TableConfig {
    pub fn new(name: impl Into<String>, duplicates: bool) -> Self {
        Self {
            name: name.into(),
            duplicates,
            duplicate_limit: default_duplicate_limit(),
            cache_size: None,
            working_directory: None,
        }
    }

    pub fn with_duplicate_limit(self, duplicate_limit: usize) -> Self {
        Self {
            duplicate_limit,
            ..self
        }
    }

    /// The size below which a redirected duplicate group moves back inline.
    pub fn demotion_limit(&self) -> usize {
        self.duplicate_limit / 2
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref().map(Path::new)
    }
}

/// Configuration for the master sequence table.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct MasterTableConfig {
    /// Table name.
    pub name: String,

    /// File holding the table's snapshot.  If `None`, the table lives only
    /// in memory and syncing it has nothing to write.
    #[serde(default)]
    pub path: Option<String>,
}

impl MasterTableConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }

    pub fn with_path(self, path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..self
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(Path::new)
    }
}
