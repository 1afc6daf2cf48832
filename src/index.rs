//! index
//!
//! The staging area: a sorted list of `(path, mode, oid, stage)` entries.
//!
//! Stage 0 is the normal, resolved state of a path. Stages 1-3 hold the
//! ancestor, ours and theirs sides of an unresolved conflict. A path has
//! either one stage-0 entry or a set of conflict entries, never both;
//! every mutation keeps that true and [`Index::load`] rejects files that
//! break it.
//!
//! On disk the index is `<repo>/index.json`, replaced atomically while
//! holding `<repo>/index.lock`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::ops::journal::write_durable;
use crate::core::ops::lock::FileLock;
use crate::core::paths::RepoPaths;
use crate::core::types::{FileMode, HashAlgorithm, Oid};
use crate::error::{Error, Result};
use crate::object::tree::{flatten, validate_entry_name};
use crate::object::TreeUpdater;
use crate::odb::Odb;

const INDEX_VERSION: u32 = 1;

/// Stage of an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Normal,
    Ancestor,
    Ours,
    Theirs,
}

impl Stage {
    pub fn number(self) -> u8 {
        match self {
            Stage::Normal => 0,
            Stage::Ancestor => 1,
            Stage::Ours => 2,
            Stage::Theirs => 3,
        }
    }

    pub fn is_conflict(self) -> bool {
        self != Stage::Normal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub path: String,
    pub mode: FileMode,
    pub oid: Oid,
    pub stage: Stage,
}

/// The three sides of a conflicted path. A side is `None` when the path
/// does not exist there (e.g. deleted by one side).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConflict {
    pub path: String,
    pub ancestor: Option<IndexEntry>,
    pub ours: Option<IndexEntry>,
    pub theirs: Option<IndexEntry>,
}

/// One side handed to [`Index::add_conflict`].
pub type ConflictSide = Option<(FileMode, Oid)>;

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    hash: HashAlgorithm,
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: BTreeMap<(String, Stage), IndexEntry>,
}

fn validate_path(path: &str) -> Result<()> {
    if path.split('/').any(|c| validate_entry_name(c).is_err()) {
        return Err(Error::InvalidSpec(format!("invalid index path '{path}'")));
    }
    Ok(())
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries sorted by `(path, stage)`.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn get(&self, path: &str, stage: Stage) -> Option<&IndexEntry> {
        self.entries.get(&(path.to_string(), stage))
    }

    fn stages_of(&self, path: &str) -> impl Iterator<Item = &IndexEntry> {
        self.entries
            .range((path.to_string(), Stage::Normal)..=(path.to_string(), Stage::Theirs))
            .map(|(_, entry)| entry)
    }

    fn clear_path(&mut self, path: &str) -> bool {
        let mut removed = false;
        for stage in [Stage::Normal, Stage::Ancestor, Stage::Ours, Stage::Theirs] {
            removed |= self.entries.remove(&(path.to_string(), stage)).is_some();
        }
        removed
    }

    /// Stage `path` as resolved content, dropping any conflict on it.
    pub fn add(&mut self, path: impl Into<String>, mode: FileMode, oid: Oid) -> Result<()> {
        let path = path.into();
        validate_path(&path)?;
        if mode.is_tree() {
            return Err(Error::InvalidSpec(format!(
                "index entries cannot be directories: '{path}'"
            )));
        }
        self.clear_path(&path);
        self.entries.insert(
            (path.clone(), Stage::Normal),
            IndexEntry {
                path,
                mode,
                oid,
                stage: Stage::Normal,
            },
        );
        Ok(())
    }

    /// Drop every stage of `path`. Returns whether anything was removed.
    pub fn remove(&mut self, path: &str) -> bool {
        self.clear_path(path)
    }

    /// Record a conflict on `path`, replacing whatever was staged.
    pub fn add_conflict(
        &mut self,
        path: impl Into<String>,
        ancestor: ConflictSide,
        ours: ConflictSide,
        theirs: ConflictSide,
    ) -> Result<()> {
        let path = path.into();
        validate_path(&path)?;
        if ours.is_none() && theirs.is_none() && ancestor.is_none() {
            return Err(Error::InvalidSpec(format!(
                "conflict on '{path}' needs at least one side"
            )));
        }
        self.clear_path(&path);
        for (stage, side) in [
            (Stage::Ancestor, ancestor),
            (Stage::Ours, ours),
            (Stage::Theirs, theirs),
        ] {
            if let Some((mode, oid)) = side {
                self.entries.insert(
                    (path.clone(), stage),
                    IndexEntry {
                        path: path.clone(),
                        mode,
                        oid,
                        stage,
                    },
                );
            }
        }
        Ok(())
    }

    /// Resolve a conflicted path with the given content.
    ///
    /// # Errors
    ///
    /// `NotFound` if `path` is not conflicted.
    pub fn resolve(&mut self, path: &str, mode: FileMode, oid: Oid) -> Result<()> {
        if !self.is_conflicted(path) {
            return Err(Error::not_found("conflict", path));
        }
        self.add(path, mode, oid)
    }

    /// Resolve a conflicted path by deleting it.
    pub fn resolve_removed(&mut self, path: &str) -> Result<()> {
        if !self.is_conflicted(path) {
            return Err(Error::not_found("conflict", path));
        }
        self.clear_path(path);
        Ok(())
    }

    pub fn is_conflicted(&self, path: &str) -> bool {
        self.stages_of(path).any(|e| e.stage.is_conflict())
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.keys().any(|(_, stage)| stage.is_conflict())
    }

    /// Conflicted paths in path order.
    pub fn conflicts(&self) -> impl Iterator<Item = IndexConflict> + '_ {
        let mut last: Option<&str> = None;
        self.entries
            .iter()
            .filter(|((_, stage), _)| stage.is_conflict())
            .filter_map(move |((path, _), _)| {
                if last == Some(path.as_str()) {
                    return None;
                }
                last = Some(path.as_str());
                Some(IndexConflict {
                    path: path.clone(),
                    ancestor: self.get(path, Stage::Ancestor).cloned(),
                    ours: self.get(path, Stage::Ours).cloned(),
                    theirs: self.get(path, Stage::Theirs).cloned(),
                })
            })
    }

    /// Replace the whole index with the flattened contents of `tree`.
    pub fn read_tree(&mut self, odb: &Odb, tree: &Oid) -> Result<()> {
        let files = flatten(odb, tree)?;
        self.entries.clear();
        for (path, entry) in files {
            self.add(path, entry.mode, entry.oid)?;
        }
        debug!(%tree, entries = self.entries.len(), "read tree into index");
        Ok(())
    }

    pub fn from_tree(odb: &Odb, tree: &Oid) -> Result<Self> {
        let mut index = Self::new();
        index.read_tree(odb, tree)?;
        Ok(index)
    }

    /// Write the staged content as nested trees and return the root id.
    ///
    /// # Errors
    ///
    /// - `Conflict` while any path is conflicted
    /// - `InvalidState` when a path is staged both as a file and as a
    ///   directory (`a` and `a/b`)
    /// - `DanglingReference` when a staged blob is missing from `odb`
    pub fn write_tree(&self, odb: &Odb) -> Result<Oid> {
        if self.has_conflicts() {
            let paths: Vec<String> = self.conflicts().map(|c| c.path).collect();
            return Err(Error::Conflicted(paths.join(", ")));
        }

        let files: BTreeSet<&str> = self.entries.keys().map(|(p, _)| p.as_str()).collect();
        for path in &files {
            let mut prefix = *path;
            while let Some((parent, _)) = prefix.rsplit_once('/') {
                if files.contains(parent) {
                    return Err(Error::InvalidState(format!(
                        "'{parent}' is staged as a file and as a directory"
                    )));
                }
                prefix = parent;
            }
        }

        let mut updater = TreeUpdater::new(odb);
        for entry in self.entries.values() {
            updater.upsert(entry.path.clone(), entry.mode, entry.oid);
        }
        let root = updater.apply(None)?;
        debug!(%root, entries = self.entries.len(), "wrote index tree");
        Ok(root)
    }

    fn check_invariant(&self) -> Result<()> {
        let mut last: Option<(&str, bool)> = None;
        for (path, stage) in self.entries.keys() {
            let conflict = stage.is_conflict();
            if let Some((prev, prev_conflict)) = last {
                if prev == path && prev_conflict != conflict {
                    return Err(Error::corrupt(
                        "index",
                        format!("'{path}' has both resolved and conflict entries"),
                    ));
                }
            }
            last = Some((path.as_str(), conflict));
        }
        Ok(())
    }

    // Persistence

    /// Load `<repo>/index.json`; a missing file is an empty index.
    pub fn load(paths: &RepoPaths, algorithm: HashAlgorithm) -> Result<Self> {
        let path = paths.index_path();
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(Error::at_path(path)(e)),
        };
        let file: IndexFile = serde_json::from_slice(&content)
            .map_err(|e| Error::corrupt("index", e.to_string()))?;
        if file.version != INDEX_VERSION {
            return Err(Error::corrupt(
                "index",
                format!("unsupported version {}", file.version),
            ));
        }
        if file.hash != algorithm {
            return Err(Error::corrupt(
                "index",
                format!("written for {}, repository uses {algorithm}", file.hash),
            ));
        }

        let mut index = Self::new();
        for entry in file.entries {
            validate_path(&entry.path).map_err(|e| Error::corrupt("index", e.to_string()))?;
            let key = (entry.path.clone(), entry.stage);
            if index.entries.insert(key, entry).is_some() {
                return Err(Error::corrupt("index", "duplicate entry"));
            }
        }
        index.check_invariant()?;
        Ok(index)
    }

    /// Persist to `<repo>/index.json` under the index lock.
    pub fn save(&self, paths: &RepoPaths, algorithm: HashAlgorithm) -> Result<()> {
        self.check_invariant()?;
        let _lock = FileLock::acquire(&paths.index_lock_path())?;
        let file = IndexFile {
            version: INDEX_VERSION,
            hash: algorithm,
            entries: self.entries.values().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| Error::corrupt("index", e.to_string()))?;
        let path = paths.index_path();
        write_durable(&path, &json).map_err(Error::at_path(path))?;
        debug!(entries = self.entries.len(), "saved index");
        Ok(())
    }
}
