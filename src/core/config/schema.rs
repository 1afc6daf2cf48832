//! core::config::schema
//!
//! Configuration schema types.
//!
//! The same schema is used for the global file and the repository file;
//! every field is optional so a file only states what it overrides.
//!
//! # Example
//!
//! ```toml
//! [core]
//! hash = "sha1"
//! abbrev = 7
//! compression = 6
//!
//! [diff]
//! context_lines = 3
//! renames = true
//! rename_threshold = 50
//! algorithm = "patience"
//!
//! [merge]
//! favor = "normal"
//! conflict_style = "diff3"
//!
//! [user]
//! name = "Ada Lovelace"
//! email = "ada@example.com"
//! ```
//!
//! # Validation
//!
//! Values are validated after parsing; unknown keys are rejected.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::HashAlgorithm;
use crate::diff::DiffAlgorithm;
use crate::merge::{ConflictStyle, MergeFavor};

/// One configuration file (global or repository scope).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub core: Option<CoreSection>,
    pub diff: Option<DiffSection>,
    pub merge: Option<MergeSection>,
    pub user: Option<UserSection>,
}

/// `[core]` - storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CoreSection {
    /// Object id digest. Only honored when a repository is created.
    pub hash: Option<HashAlgorithm>,
    /// Default length of abbreviated ids.
    pub abbrev: Option<usize>,
    /// zlib level for loose objects (0-9).
    pub compression: Option<u32>,
    /// Maximum number of decoded objects kept in memory.
    pub cache_objects: Option<usize>,
    /// Maximum length of a symbolic reference chain.
    pub symref_depth: Option<usize>,
    /// Reference holding object notes.
    pub notes_ref: Option<String>,
}

/// `[diff]` - defaults for diff options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DiffSection {
    pub context_lines: Option<u32>,
    pub renames: Option<bool>,
    /// Similarity percentage (0-100) at which a pair counts as a rename.
    pub rename_threshold: Option<u8>,
    /// Maximum number of rename candidates on either side.
    pub rename_limit: Option<usize>,
    pub algorithm: Option<DiffAlgorithm>,
}

/// `[merge]` - defaults for merge options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MergeSection {
    pub favor: Option<MergeFavor>,
    pub conflict_style: Option<ConflictStyle>,
    pub renames: Option<bool>,
}

/// `[user]` - default identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct UserSection {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(core) = &self.core {
            if let Some(abbrev) = core.abbrev {
                if !(4..=64).contains(&abbrev) {
                    return Err(ConfigError::InvalidValue(format!(
                        "core.abbrev must be between 4 and 64, got {abbrev}"
                    )));
                }
            }
            if let Some(level) = core.compression {
                if level > 9 {
                    return Err(ConfigError::InvalidValue(format!(
                        "core.compression must be between 0 and 9, got {level}"
                    )));
                }
            }
            if let Some(depth) = core.symref_depth {
                if depth == 0 || depth > 10 {
                    return Err(ConfigError::InvalidValue(format!(
                        "core.symref_depth must be between 1 and 10, got {depth}"
                    )));
                }
            }
            if let Some(notes_ref) = &core.notes_ref {
                if !notes_ref.starts_with("refs/") {
                    return Err(ConfigError::InvalidValue(format!(
                        "core.notes_ref must start with 'refs/', got '{notes_ref}'"
                    )));
                }
            }
        }

        if let Some(diff) = &self.diff {
            if let Some(threshold) = diff.rename_threshold {
                if threshold > 100 {
                    return Err(ConfigError::InvalidValue(format!(
                        "diff.rename_threshold must be at most 100, got {threshold}"
                    )));
                }
            }
        }

        if let Some(user) = &self.user {
            for (key, value) in [("name", &user.name), ("email", &user.email)] {
                if let Some(value) = value {
                    if value.contains(['<', '>', '\n']) {
                        return Err(ConfigError::InvalidValue(format!(
                            "user.{key} cannot contain '<', '>' or newlines"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
