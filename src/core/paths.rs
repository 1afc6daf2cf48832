//! core::paths
//!
//! Centralized path routing for repository storage locations.
//!
//! # Architecture
//!
//! Every on-disk location the engine touches is computed here. No other
//! module joins path components onto the repository directory by hand,
//! so the layout can be read in one place.
//!
//! # Storage Layout
//!
//! ```text
//! <repo>/
//!   HEAD                  symbolic or direct head reference
//!   config.toml           repository configuration
//!   objects/xx/yyyy...    loose objects (zlib)
//!   refs/heads, refs/tags reference files
//!   logs/<refname>        reflogs
//!   index.json            staging area
//!   refs.lock             ref transaction lock
//!   index.lock            index write lock
//!   ops/                  operation journals
//!   op-state.json         marker of the operation in progress
//!   rebase/state.json     persisted rebase state machine
//! ```
//!
//! # Example
//!
//! ```
//! use grove::core::paths::RepoPaths;
//! use std::path::PathBuf;
//!
//! let paths = RepoPaths::new(PathBuf::from("/work/.grove"));
//! assert_eq!(paths.objects_dir(), PathBuf::from("/work/.grove/objects"));
//! assert_eq!(paths.config_path(), PathBuf::from("/work/.grove/config.toml"));
//! ```

use std::path::{Path, PathBuf};

use crate::core::types::{Oid, RefName};

/// Name of the repository directory created inside a work tree.
pub const REPO_DIR_NAME: &str = ".grove";

/// Centralized path routing for repository storage.
///
/// # Invariants
///
/// - All repository-scoped storage lives under `root`
/// - No code outside this module joins paths onto `root`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    root: PathBuf,
}

impl RepoPaths {
    /// Create paths for a repository rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Walk upwards from `start` looking for a repository.
    ///
    /// A directory qualifies when it contains a `HEAD` file, either
    /// directly (bare layout) or under [`REPO_DIR_NAME`].
    pub fn discover(start: &Path) -> Option<Self> {
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir.join("HEAD").is_file() && dir.join("objects").is_dir() {
                return Some(Self::new(dir.to_path_buf()));
            }
            let nested = dir.join(REPO_DIR_NAME);
            if nested.join("HEAD").is_file() {
                return Some(Self::new(nested));
            }
            current = dir.parent();
        }
        None
    }

    /// Repository root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn head_path(&self) -> PathBuf {
        self.root.join("HEAD")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    /// Loose object location: `objects/<first 2 hex>/<rest>`.
    pub fn loose_object_path(objects_dir: &Path, oid: &Oid) -> PathBuf {
        let hex = oid.to_hex();
        objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    pub fn refs_dir(&self) -> PathBuf {
        self.root.join("refs")
    }

    /// File backing a reference. Pseudo refs (`HEAD`) live at the root.
    pub fn ref_path(&self, name: &RefName) -> PathBuf {
        self.root.join(name.as_str())
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Reflog file of a reference.
    pub fn reflog_path(&self, name: &RefName) -> PathBuf {
        self.logs_dir().join(name.as_str())
    }

    /// Lock serializing reference transactions.
    pub fn refs_lock_path(&self) -> PathBuf {
        self.root.join("refs.lock")
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    pub fn index_lock_path(&self) -> PathBuf {
        self.root.join("index.lock")
    }

    /// Directory for operation journals.
    pub fn ops_dir(&self) -> PathBuf {
        self.root.join("ops")
    }

    /// Path to a specific operation journal.
    pub fn op_journal_path(&self, op_id: &str) -> PathBuf {
        self.ops_dir().join(format!("{}.json", op_id))
    }

    /// Marker naming the journal of the operation in progress.
    pub fn op_state_path(&self) -> PathBuf {
        self.root.join("op-state.json")
    }

    pub fn rebase_dir(&self) -> PathBuf {
        self.root.join("rebase")
    }

    /// Persisted state of an interrupted rebase.
    pub fn rebase_state_path(&self) -> PathBuf {
        self.rebase_dir().join("state.json")
    }

    /// Create the directory skeleton of a fresh repository.
    ///
    /// # Errors
    ///
    /// Returns an IO error if directory creation fails.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.objects_dir())?;
        std::fs::create_dir_all(self.refs_dir().join("heads"))?;
        std::fs::create_dir_all(self.refs_dir().join("tags"))?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.ops_dir())?;
        Ok(())
    }
}
