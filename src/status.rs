//! status
//!
//! Reconcile HEAD, the index and the working tree.
//!
//! A status is two diffs joined by path: HEAD's tree against the index
//! (what is staged) and the index against a working-tree snapshot (what
//! is not). Each path that differs in either comparison gets one
//! [`StatusEntry`] carrying the delta from each side.
//!
//! Entries are keyed by their index path: the new path of a staged
//! rename, the old path of a working-tree rename.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::core::cancel::CancelToken;
use crate::core::config::Config;
use crate::core::types::Oid;
use crate::diff::{self, DefaultClassifier, Delta, DeltaStatus, DiffOptions, PathClassifier, WorkdirSource};
use crate::error::Result;
use crate::index::Index;
use crate::odb::Odb;

/// Which comparisons a status runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusShow {
    #[default]
    IndexAndWorkdir,
    IndexOnly,
    WorkdirOnly,
}

#[derive(Debug, Clone)]
pub struct StatusOptions {
    pub show: StatusShow,
    pub include_untracked: bool,
    pub include_ignored: bool,
    pub include_unreadable: bool,
    /// Detect renames between HEAD and the index.
    pub renames_head_to_index: bool,
    /// Detect renames between the index and the working tree.
    pub renames_index_to_workdir: bool,
    pub rename_threshold: u8,
    /// Path prefixes to include; empty means everything.
    pub pathspec: Vec<String>,
    pub classifier: Arc<dyn PathClassifier>,
    pub cancel: Option<CancelToken>,
}

impl Default for StatusOptions {
    fn default() -> Self {
        Self {
            show: StatusShow::IndexAndWorkdir,
            include_untracked: true,
            include_ignored: false,
            include_unreadable: true,
            renames_head_to_index: false,
            renames_index_to_workdir: false,
            rename_threshold: Config::DEFAULT_RENAME_THRESHOLD,
            pathspec: Vec::new(),
            classifier: Arc::new(DefaultClassifier),
            cancel: None,
        }
    }
}

impl StatusOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            rename_threshold: config.rename_threshold(),
            ..Self::default()
        }
    }

    fn diff_options(&self, renames: bool) -> DiffOptions {
        DiffOptions {
            detect_renames: renames,
            rename_threshold: self.rename_threshold,
            pathspec: self.pathspec.clone(),
            include_untracked: self.include_untracked,
            include_ignored: self.include_ignored,
            classifier: self.classifier.clone(),
            cancel: self.cancel.clone(),
            ..DiffOptions::default()
        }
    }
}

/// State of one path across HEAD, index and working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub path: String,
    pub head_to_index: Option<Delta>,
    pub index_to_workdir: Option<Delta>,
}

impl StatusEntry {
    /// Staged change, if any.
    pub fn index_status(&self) -> Option<DeltaStatus> {
        self.head_to_index.as_ref().map(|d| d.status)
    }

    /// Unstaged change, if any.
    pub fn workdir_status(&self) -> Option<DeltaStatus> {
        self.index_to_workdir.as_ref().map(|d| d.status)
    }

    pub fn is_conflicted(&self) -> bool {
        self.index_status() == Some(DeltaStatus::Conflicted)
            || self.workdir_status() == Some(DeltaStatus::Conflicted)
    }

    pub fn is_untracked(&self) -> bool {
        self.workdir_status() == Some(DeltaStatus::Untracked)
    }

    pub fn is_ignored(&self) -> bool {
        self.workdir_status() == Some(DeltaStatus::Ignored)
    }

    /// Two-column code in the style of `status --short` (`"M "`, `" D"`,
    /// `"??"`, `"UU"`).
    pub fn short_code(&self) -> String {
        if self.is_conflicted() {
            return "UU".to_string();
        }
        match self.workdir_status() {
            Some(DeltaStatus::Untracked) => return "??".to_string(),
            Some(DeltaStatus::Ignored) => return "!!".to_string(),
            _ => {}
        }
        let column = |status: Option<DeltaStatus>| status.map_or(' ', DeltaStatus::as_char);
        format!("{}{}", column(self.index_status()), column(self.workdir_status()))
    }
}

impl fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.head_to_index {
            Some(delta) if matches!(delta.status, DeltaStatus::Renamed | DeltaStatus::Copied) => {
                write!(
                    f,
                    "{} {} -> {}",
                    self.short_code(),
                    delta.old_file.path,
                    delta.new_file.path
                )
            }
            _ => write!(f, "{} {}", self.short_code(), self.path),
        }
    }
}

/// Status entries in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusList {
    entries: Vec<StatusEntry>,
}

impl StatusList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&StatusEntry> {
        self.entries.get(i)
    }

    pub fn by_path(&self, path: &str) -> Option<&StatusEntry> {
        self.entries
            .binary_search_by(|entry| entry.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StatusEntry> {
        self.entries.iter()
    }

    /// Nothing staged and nothing modified; untracked and ignored files
    /// do not count.
    pub fn is_clean(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.head_to_index.is_none() && (entry.is_untracked() || entry.is_ignored()))
    }
}

impl<'s> IntoIterator for &'s StatusList {
    type Item = &'s StatusEntry;
    type IntoIter = std::slice::Iter<'s, StatusEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Path of the index side of an index-to-workdir delta.
fn index_path(delta: &Delta) -> &str {
    if delta.old_file.exists() {
        &delta.old_file.path
    } else {
        &delta.new_file.path
    }
}

fn slot<'m>(by_path: &'m mut BTreeMap<String, StatusEntry>, path: &str) -> &'m mut StatusEntry {
    by_path
        .entry(path.to_string())
        .or_insert_with(|| StatusEntry {
            path: path.to_string(),
            head_to_index: None,
            index_to_workdir: None,
        })
}

/// Compute the status of every changed path.
///
/// `head` is HEAD's tree (`None` when HEAD is unborn). `workdir` may be
/// omitted when `options.show` is [`StatusShow::IndexOnly`]; otherwise a
/// missing working tree is treated as one with no files.
pub fn statuses(
    odb: &Odb,
    head: Option<&Oid>,
    index: &Index,
    workdir: Option<&dyn WorkdirSource>,
    options: &StatusOptions,
) -> Result<StatusList> {
    let mut by_path: BTreeMap<String, StatusEntry> = BTreeMap::new();

    if options.show != StatusShow::WorkdirOnly {
        let staged = diff::tree_to_index(
            odb,
            head,
            index,
            &options.diff_options(options.renames_head_to_index),
        )?;
        for delta in staged.iter() {
            slot(&mut by_path, delta.path()).head_to_index = Some(delta.clone());
        }
    }

    if options.show != StatusShow::IndexOnly {
        let empty = diff::MemoryWorkdir::new();
        let source = workdir.unwrap_or(&empty);
        let unstaged = diff::index_to_workdir(
            odb,
            index,
            source,
            &options.diff_options(options.renames_index_to_workdir),
        )?;
        for delta in unstaged.iter() {
            if delta.status == DeltaStatus::Unreadable && !options.include_unreadable {
                continue;
            }
            slot(&mut by_path, index_path(delta)).index_to_workdir = Some(delta.clone());
        }
    }

    let list = StatusList {
        entries: by_path.into_values().collect(),
    };
    debug!(entries = list.len(), "status computed");
    Ok(list)
}

/// Status of a single path; `None` when it is unchanged everywhere.
pub fn status_file(
    odb: &Odb,
    head: Option<&Oid>,
    index: &Index,
    workdir: Option<&dyn WorkdirSource>,
    path: &str,
    options: &StatusOptions,
) -> Result<Option<StatusEntry>> {
    let options = StatusOptions {
        pathspec: vec![path.to_string()],
        renames_head_to_index: false,
        renames_index_to_workdir: false,
        ..options.clone()
    };
    let list = statuses(odb, head, index, workdir, &options)?;
    Ok(list.by_path(path).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FileMode, HashAlgorithm};
    use crate::diff::{MemoryWorkdir, PrefixIgnore};
    use crate::object::TreeUpdater;

    fn odb() -> Odb {
        Odb::in_memory(HashAlgorithm::Sha1)
    }

    fn tree(odb: &Odb, files: &[(&str, &str)]) -> Oid {
        let mut updater = TreeUpdater::new(odb);
        for (path, content) in files {
            let oid = odb.write_blob(content.as_bytes()).unwrap();
            updater.upsert(*path, FileMode::Blob, oid);
        }
        updater.apply(None).unwrap()
    }

    fn workdir(files: &[(&str, &str)]) -> MemoryWorkdir {
        let mut workdir = MemoryWorkdir::new();
        for (path, content) in files {
            workdir.insert(*path, FileMode::Blob, content).unwrap();
        }
        workdir
    }

    fn codes(list: &StatusList) -> Vec<(String, String)> {
        list.iter().map(|e| (e.path.clone(), e.short_code())).collect()
    }

    #[test]
    fn staged_unstaged_and_untracked() {
        let odb = odb();
        let head = tree(&odb, &[("a", "1\n"), ("b", "2\n"), ("c", "3\n")]);
        // Stage: modify a, delete c, add d.
        let staged = tree(&odb, &[("a", "one\n"), ("b", "2\n"), ("d", "4\n")]);
        let index = Index::from_tree(&odb, &staged).unwrap();
        // Working tree: b modified, d deleted, e new.
        let files = workdir(&[("a", "one\n"), ("b", "two\n"), ("e", "5\n")]);

        let list = statuses(&odb, Some(&head), &index, Some(&files), &StatusOptions::default()).unwrap();
        assert_eq!(
            codes(&list),
            vec![
                ("a".into(), "M ".into()),
                ("b".into(), " M".into()),
                ("c".into(), "D ".into()),
                ("d".into(), "AD".into()),
                ("e".into(), "??".into()),
            ]
        );
        assert!(!list.is_clean());
        assert!(list.by_path("e").unwrap().is_untracked());
        assert!(list.by_path("zzz").is_none());
    }

    #[test]
    fn clean_tree_has_no_entries_but_untracked() {
        let odb = odb();
        let head = tree(&odb, &[("a", "1\n")]);
        let index = Index::from_tree(&odb, &head).unwrap();
        let files = workdir(&[("a", "1\n"), ("new", "x\n")]);

        let list = statuses(&odb, Some(&head), &index, Some(&files), &StatusOptions::default()).unwrap();
        assert_eq!(codes(&list), vec![("new".into(), "??".into())]);
        assert!(list.is_clean());

        let options = StatusOptions {
            include_untracked: false,
            ..StatusOptions::default()
        };
        let list = statuses(&odb, Some(&head), &index, Some(&files), &options).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn show_limits_the_comparisons() {
        let odb = odb();
        let head = tree(&odb, &[("a", "1\n")]);
        let index = Index::from_tree(&odb, &tree(&odb, &[("a", "2\n")])).unwrap();
        let files = workdir(&[("a", "3\n")]);

        let index_only = StatusOptions {
            show: StatusShow::IndexOnly,
            ..StatusOptions::default()
        };
        let list = statuses(&odb, Some(&head), &index, None, &index_only).unwrap();
        assert_eq!(codes(&list), vec![("a".into(), "M ".into())]);

        let workdir_only = StatusOptions {
            show: StatusShow::WorkdirOnly,
            ..StatusOptions::default()
        };
        let list = statuses(&odb, Some(&head), &index, Some(&files), &workdir_only).unwrap();
        assert_eq!(codes(&list), vec![("a".into(), " M".into())]);
    }

    #[test]
    fn unborn_head_stages_everything_as_added() {
        let odb = odb();
        let index = Index::from_tree(&odb, &tree(&odb, &[("a", "1\n")])).unwrap();
        let files = workdir(&[("a", "1\n")]);
        let list = statuses(&odb, None, &index, Some(&files), &StatusOptions::default()).unwrap();
        assert_eq!(codes(&list), vec![("a".into(), "A ".into())]);
    }

    #[test]
    fn conflicts_and_ignored_files() {
        let odb = odb();
        let head = tree(&odb, &[("f", "base\n")]);
        let ours = odb.write_blob(b"ours\n").unwrap();
        let theirs = odb.write_blob(b"theirs\n").unwrap();
        let mut index = Index::from_tree(&odb, &head).unwrap();
        index
            .add_conflict(
                "f",
                None,
                Some((FileMode::Blob, ours)),
                Some((FileMode::Blob, theirs)),
            )
            .unwrap();
        let files = workdir(&[("f", "<<<<<<<\n"), ("target/out", "bin\n")]);
        let options = StatusOptions {
            include_ignored: true,
            classifier: Arc::new(PrefixIgnore::new(["target/"])),
            ..StatusOptions::default()
        };

        let list = statuses(&odb, Some(&head), &index, Some(&files), &options).unwrap();
        assert_eq!(
            codes(&list),
            vec![("f".into(), "UU".into()), ("target/out".into(), "!!".into())]
        );
        assert!(list.by_path("f").unwrap().is_conflicted());
    }

    #[test]
    fn staged_rename_is_reported_under_new_path() {
        let odb = odb();
        let body = "1\n2\n3\n4\n";
        let head = tree(&odb, &[("old.txt", body)]);
        let index = Index::from_tree(&odb, &tree(&odb, &[("new.txt", body)])).unwrap();
        let files = workdir(&[("new.txt", body)]);
        let options = StatusOptions {
            renames_head_to_index: true,
            ..StatusOptions::default()
        };

        let list = statuses(&odb, Some(&head), &index, Some(&files), &options).unwrap();
        assert_eq!(list.len(), 1);
        let entry = list.get(0).unwrap();
        assert_eq!(entry.index_status(), Some(DeltaStatus::Renamed));
        assert_eq!(entry.to_string(), "R  old.txt -> new.txt");
    }

    #[test]
    fn single_file_status() {
        let odb = odb();
        let head = tree(&odb, &[("a", "1\n"), ("b", "2\n")]);
        let index = Index::from_tree(&odb, &head).unwrap();
        let files = workdir(&[("a", "1\n"), ("b", "changed\n")]);
        let options = StatusOptions::default();

        let b = status_file(&odb, Some(&head), &index, Some(&files), "b", &options).unwrap();
        assert_eq!(b.unwrap().workdir_status(), Some(DeltaStatus::Modified));
        let a = status_file(&odb, Some(&head), &index, Some(&files), "a", &options).unwrap();
        assert!(a.is_none());
    }
}
