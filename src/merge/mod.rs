//! merge
//!
//! Three-way merging of trees and file contents.
//!
//! A merge produces a [`MergeOutcome`]: an [`Index`] holding stage-0
//! entries for every resolved path and stage 1/2/3 entries for every
//! unresolved one, plus a description of each conflict. Conflicts are
//! part of the result, not errors; `Err` is reserved for structural
//! failures such as a missing object. Nothing is committed here.
//!
//! - [`file`]: line-level diff3 merge of one file
//! - [`tree`]: path-level merge of three trees, with rename handling
//! - [`commit`]: merge bases, cherry-pick, revert and merge analysis

pub mod commit;
pub mod file;
pub mod tree;

use serde::{Deserialize, Serialize};

pub use commit::{cherry_pick, merge_analysis, merge_commits, revert, MergeAnalysis};
pub use file::{merge_file, FileMergeOptions, FileMergeResult, MergeFileInput};
pub use tree::merge_trees;

use crate::core::cancel::CancelToken;
use crate::core::config::Config;
use crate::core::types::Oid;
use crate::diff::{DiffAlgorithm, WhitespaceMode};
use crate::error::Result;
use crate::index::Index;
use crate::odb::Odb;

/// How conflicting hunks are settled without markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeFavor {
    /// Leave conflicts in place.
    #[default]
    Normal,
    Ours,
    Theirs,
    /// Keep both sides, ours first.
    Union,
}

/// Layout of conflict markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStyle {
    #[default]
    Merge,
    /// Also show the ancestor's lines between `|||||||` and `=======`.
    Diff3,
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Follow renames on either side when pairing paths.
    pub renames: bool,
    pub rename_threshold: u8,
    pub favor: MergeFavor,
    pub style: ConflictStyle,
    pub whitespace: WhitespaceMode,
    pub algorithm: DiffAlgorithm,
    pub ancestor_label: String,
    pub our_label: String,
    pub their_label: String,
    pub cancel: Option<CancelToken>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            renames: true,
            rename_threshold: Config::DEFAULT_RENAME_THRESHOLD,
            favor: MergeFavor::Normal,
            style: ConflictStyle::Merge,
            whitespace: WhitespaceMode::None,
            algorithm: DiffAlgorithm::Myers,
            ancestor_label: "base".to_string(),
            our_label: "ours".to_string(),
            their_label: "theirs".to_string(),
            cancel: None,
        }
    }
}

impl MergeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            renames: config.merge_renames(),
            rename_threshold: config.rename_threshold(),
            favor: config.merge_favor(),
            style: config.conflict_style(),
            algorithm: config.diff_algorithm(),
            ..Self::default()
        }
    }

    pub(crate) fn file_options(&self) -> FileMergeOptions {
        FileMergeOptions {
            ancestor_label: self.ancestor_label.clone(),
            our_label: self.our_label.clone(),
            their_label: self.their_label.clone(),
            favor: self.favor,
            style: self.style,
            whitespace: self.whitespace,
            algorithm: self.algorithm,
        }
    }
}

/// What kind of disagreement left a path unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// Both sides edited overlapping lines.
    Content,
    /// We modified, they deleted.
    ModifyDelete,
    /// We deleted, they modified.
    DeleteModify,
    /// Both sides added different content at the same path.
    AddAdd,
    /// Both sides renamed the same path to different names.
    RenameRename,
    /// One side renamed a path the other deleted.
    RenameDelete,
    /// The sides disagree on file, symlink or submodule.
    TypeChange,
    /// A file on one side is a directory on the other.
    DirectoryFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub kind: ConflictKind,
    /// Path the conflict is staged under.
    pub path: String,
    /// Second staged path of a rename/rename conflict.
    pub other_path: Option<String>,
    /// Blob holding the content with conflict markers, for content conflicts.
    pub marked: Option<Oid>,
}

/// Result of a tree-level merge.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub index: Index,
    pub conflicts: Vec<MergeConflict>,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Write the merged tree. Fails with `Conflict` while conflicts remain.
    pub fn write_tree(&self, odb: &Odb) -> Result<Oid> {
        self.index.write_tree(odb)
    }
}
