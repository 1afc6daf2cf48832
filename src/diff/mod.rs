//! diff
//!
//! Structural comparison of trees, the index and working-tree snapshots.
//!
//! # Architecture
//!
//! Each side is first reduced to a sorted `path -> (mode, id)` map. A
//! single merge-join over the two maps classifies every path; rename and
//! copy detection then folds matching deletions and additions together.
//! Line-level detail ([`Patch`]) is computed on demand per delta.
//!
//! # Example
//!
//! ```
//! use grove::core::types::{FileMode, HashAlgorithm};
//! use grove::diff::{self, DeltaStatus, DiffOptions};
//! use grove::object::TreeBuilder;
//! use grove::odb::Odb;
//!
//! let odb = Odb::in_memory(HashAlgorithm::Sha1);
//! let hello = odb.write_blob(b"hello")?;
//! let mut builder = TreeBuilder::new(&odb);
//! builder.insert("a.txt", FileMode::Blob, hello)?;
//! let t1 = builder.write()?;
//! builder.insert("b.txt", FileMode::Blob, hello)?;
//! let t2 = builder.write()?;
//!
//! let diff = diff::tree_to_tree(&odb, Some(&t1), Some(&t2), &DiffOptions::default())?;
//! assert_eq!(diff.len(), 1);
//! assert_eq!(diff.deltas()[0].status, DeltaStatus::Added);
//! assert_eq!(diff.deltas()[0].new_file.path, "b.txt");
//! # Ok::<(), grove::Error>(())
//! ```

pub mod apply;
pub mod lines;
pub mod patch;
pub mod rename;
pub mod workdir;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

pub use apply::apply_to_tree;
pub use lines::{DiffAlgorithm, WhitespaceMode};
pub use patch::{DiffLine, Hunk, LineOrigin, Patch};
pub use workdir::{
    DefaultClassifier, FsWorkdir, MemoryWorkdir, PathClassifier, PrefixIgnore, WorkdirFile, WorkdirSource,
};

use crate::core::cancel::{self, CancelToken};
use crate::core::config::Config;
use crate::core::types::{FileMode, ObjectType, Oid};
use crate::error::{Error, Result};
use crate::index::{Index, Stage};
use crate::object::tree::{flatten, join_path, Tree, TreeEntry};
use crate::odb::Odb;

/// Classification of one changed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaStatus {
    Unmodified,
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    Ignored,
    Untracked,
    TypeChanged,
    Unreadable,
    Conflicted,
}

impl DeltaStatus {
    /// Single-character form used by name-status output.
    pub fn as_char(self) -> char {
        match self {
            DeltaStatus::Unmodified => ' ',
            DeltaStatus::Added => 'A',
            DeltaStatus::Deleted => 'D',
            DeltaStatus::Modified => 'M',
            DeltaStatus::Renamed => 'R',
            DeltaStatus::Copied => 'C',
            DeltaStatus::Ignored => '!',
            DeltaStatus::Untracked => '?',
            DeltaStatus::TypeChanged => 'T',
            DeltaStatus::Unreadable => 'X',
            DeltaStatus::Conflicted => 'U',
        }
    }
}

impl fmt::Display for DeltaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One side of a delta. `mode` is `None` when the path is absent on that side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    pub path: String,
    pub mode: Option<FileMode>,
    pub oid: Oid,
    pub size: u64,
}

impl DiffFile {
    pub fn exists(&self) -> bool {
        self.mode.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub status: DeltaStatus,
    pub old_file: DiffFile,
    pub new_file: DiffFile,
    /// Score of a rename or copy pairing, 0-100.
    pub similarity: Option<u8>,
}

impl Delta {
    /// Path the delta sorts under: the new path, or the old one for deletions.
    pub fn path(&self) -> &str {
        if self.new_file.exists() || !self.old_file.exists() {
            &self.new_file.path
        } else {
            &self.old_file.path
        }
    }
}

/// Diff options, defaulted from configuration.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    pub context_lines: u32,
    /// Extra unchanged lines allowed between two hunks before they split.
    pub interhunk_lines: u32,
    pub detect_renames: bool,
    /// Also pair additions with modified or unmodified sources. Implies renames.
    pub detect_copies: bool,
    pub rename_threshold: u8,
    pub rename_limit: usize,
    pub whitespace: WhitespaceMode,
    /// Path prefixes to include; empty means everything.
    pub pathspec: Vec<String>,
    pub include_unmodified: bool,
    pub include_untracked: bool,
    pub include_ignored: bool,
    /// Report mode-class changes as `TypeChanged` rather than `Modified`.
    pub include_typechange: bool,
    pub reverse: bool,
    pub algorithm: DiffAlgorithm,
    pub classifier: Arc<dyn PathClassifier>,
    pub cancel: Option<CancelToken>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            context_lines: Config::DEFAULT_CONTEXT_LINES,
            interhunk_lines: 0,
            detect_renames: true,
            detect_copies: false,
            rename_threshold: Config::DEFAULT_RENAME_THRESHOLD,
            rename_limit: Config::DEFAULT_RENAME_LIMIT,
            whitespace: WhitespaceMode::None,
            pathspec: Vec::new(),
            include_unmodified: false,
            include_untracked: false,
            include_ignored: false,
            include_typechange: true,
            reverse: false,
            algorithm: DiffAlgorithm::Myers,
            classifier: Arc::new(DefaultClassifier),
            cancel: None,
        }
    }
}

impl DiffOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            context_lines: config.diff_context_lines(),
            detect_renames: config.diff_renames(),
            rename_threshold: config.rename_threshold(),
            rename_limit: config.rename_limit(),
            algorithm: config.diff_algorithm(),
            ..Self::default()
        }
    }

    fn matches(&self, path: &str) -> bool {
        self.pathspec.is_empty()
            || self.pathspec.iter().any(|spec| {
                let spec = spec.trim_end_matches('/');
                spec.is_empty()
                    || path == spec
                    || (path.starts_with(spec) && path.as_bytes().get(spec.len()) == Some(&b'/'))
            })
    }
}

/// Totals over a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Normal,
    Ignored,
    Unreadable,
}

#[derive(Debug, Clone)]
struct SideEntry {
    mode: FileMode,
    oid: Oid,
    state: EntryState,
}

/// One side reduced to sorted path maps.
#[derive(Debug, Default)]
struct Snapshot {
    files: BTreeMap<String, SideEntry>,
    conflicted: BTreeMap<String, SideEntry>,
    workdir: bool,
}

fn normal(mode: FileMode, oid: Oid) -> SideEntry {
    SideEntry {
        mode,
        oid,
        state: EntryState::Normal,
    }
}

impl Snapshot {
    fn tree(odb: &Odb, tree: Option<&Oid>) -> Result<Self> {
        let mut snapshot = Snapshot::default();
        if let Some(tree) = tree {
            for (path, entry) in flatten(odb, tree)? {
                snapshot.files.insert(path, normal(entry.mode, entry.oid));
            }
        }
        Ok(snapshot)
    }

    /// Both sides of a tree comparison. Unless `keep_unchanged` is set,
    /// subtrees with the same id on both sides are skipped without being
    /// read, and identical files are left out.
    fn tree_pair(
        odb: &Odb,
        old: Option<&Oid>,
        new: Option<&Oid>,
        keep_unchanged: bool,
    ) -> Result<(Self, Self)> {
        if keep_unchanged {
            return Ok((Self::tree(odb, old)?, Self::tree(odb, new)?));
        }
        let mut old_side = Snapshot::default();
        let mut new_side = Snapshot::default();
        changed_entries(
            odb,
            old.copied(),
            new.copied(),
            "",
            &mut old_side.files,
            &mut new_side.files,
        )?;
        Ok((old_side, new_side))
    }

    fn index(index: &Index) -> Self {
        let mut snapshot = Snapshot::default();
        for entry in index.entries() {
            if entry.stage == Stage::Normal {
                snapshot
                    .files
                    .insert(entry.path.clone(), normal(entry.mode, entry.oid));
            }
        }
        for conflict in index.conflicts() {
            let side = conflict.ours.or(conflict.theirs).or(conflict.ancestor);
            if let Some(side) = side {
                snapshot
                    .conflicted
                    .insert(conflict.path, normal(side.mode, side.oid));
            }
        }
        snapshot
    }

    fn workdir(
        odb: &Odb,
        source: &dyn WorkdirSource,
        options: &DiffOptions,
        blobs: &mut HashMap<Oid, Arc<[u8]>>,
    ) -> Result<Self> {
        let mut snapshot = Snapshot {
            workdir: true,
            ..Snapshot::default()
        };
        for file in source.files()? {
            let state = if options.classifier.is_ignored(&file.path) {
                EntryState::Ignored
            } else {
                EntryState::Normal
            };
            let entry = match file.content {
                Some(content) => {
                    let oid = odb.hash(ObjectType::Blob, &content);
                    blobs.insert(oid, content);
                    SideEntry {
                        mode: file.mode,
                        oid,
                        state,
                    }
                }
                None => SideEntry {
                    mode: file.mode,
                    oid: Oid::zero(odb.algorithm()),
                    state: EntryState::Unreadable,
                },
            };
            snapshot.files.insert(file.path, entry);
        }
        Ok(snapshot)
    }
}

fn changed_entries(
    odb: &Odb,
    old: Option<Oid>,
    new: Option<Oid>,
    prefix: &str,
    old_out: &mut BTreeMap<String, SideEntry>,
    new_out: &mut BTreeMap<String, SideEntry>,
) -> Result<()> {
    if old == new {
        return Ok(());
    }
    let read = |oid: Option<Oid>| -> Result<Tree> {
        match oid {
            Some(oid) => odb.find_tree(&oid),
            None => Ok(Tree::default()),
        }
    };
    let old_tree = read(old)?;
    let new_tree = read(new)?;
    let mut names: BTreeMap<&str, (Option<&TreeEntry>, Option<&TreeEntry>)> = BTreeMap::new();
    for entry in old_tree.iter() {
        names.entry(entry.name.as_str()).or_default().0 = Some(entry);
    }
    for entry in new_tree.iter() {
        names.entry(entry.name.as_str()).or_default().1 = Some(entry);
    }

    for (name, (o, n)) in names {
        if let (Some(o), Some(n)) = (o, n) {
            if o.mode == n.mode && o.oid == n.oid {
                continue;
            }
        }
        let path = join_path(prefix, name);
        let old_dir = o.filter(|e| e.is_tree()).map(|e| e.oid);
        let new_dir = n.filter(|e| e.is_tree()).map(|e| e.oid);
        if old_dir.is_some() || new_dir.is_some() {
            changed_entries(odb, old_dir, new_dir, &path, old_out, new_out)?;
        }
        if let Some(o) = o.filter(|e| !e.is_tree()) {
            old_out.insert(path.clone(), normal(o.mode, o.oid));
        }
        if let Some(n) = n.filter(|e| !e.is_tree()) {
            new_out.insert(path, normal(n.mode, n.oid));
        }
    }
    Ok(())
}

/// An ordered list of deltas plus what is needed to expand them into patches.
#[derive(Debug)]
pub struct Diff<'a> {
    odb: &'a Odb,
    deltas: Vec<Delta>,
    options: DiffOptions,
    /// Working-tree content not present in the object store.
    blobs: HashMap<Oid, Arc<[u8]>>,
}

impl<'a> Diff<'a> {
    fn build(
        odb: &'a Odb,
        mut old: Snapshot,
        mut new: Snapshot,
        options: &DiffOptions,
        blobs: HashMap<Oid, Arc<[u8]>>,
    ) -> Result<Self> {
        if options.reverse {
            std::mem::swap(&mut old, &mut new);
        }
        let mut diff = Diff {
            odb,
            deltas: Vec::new(),
            options: options.clone(),
            blobs,
        };
        let copies = options.detect_copies;

        let paths: BTreeSet<&String> = old
            .files
            .keys()
            .chain(new.files.keys())
            .chain(old.conflicted.keys())
            .chain(new.conflicted.keys())
            .filter(|path| options.matches(path))
            .collect();

        for path in paths {
            cancel::check(options.cancel.as_ref())?;
            let old_entry = old.files.get(path).or_else(|| old.conflicted.get(path));
            let new_entry = new.files.get(path).or_else(|| new.conflicted.get(path));
            let conflicted = old.conflicted.contains_key(path) || new.conflicted.contains_key(path);

            let status = if conflicted {
                DeltaStatus::Conflicted
            } else {
                match (old_entry, new_entry) {
                    (_, Some(n)) if n.state == EntryState::Unreadable => DeltaStatus::Unreadable,
                    (None, Some(n)) if n.state == EntryState::Ignored => {
                        if !options.include_ignored {
                            continue;
                        }
                        DeltaStatus::Ignored
                    }
                    (None, Some(_)) if new.workdir => {
                        if !options.include_untracked {
                            continue;
                        }
                        DeltaStatus::Untracked
                    }
                    (None, Some(_)) => DeltaStatus::Added,
                    (Some(_), None) => DeltaStatus::Deleted,
                    (Some(o), Some(n)) if o.mode == n.mode && o.oid == n.oid => {
                        if !options.include_unmodified && !copies {
                            continue;
                        }
                        DeltaStatus::Unmodified
                    }
                    (Some(o), Some(n)) if o.mode.class() != n.mode.class() && options.include_typechange => {
                        DeltaStatus::TypeChanged
                    }
                    (Some(_), Some(_)) => DeltaStatus::Modified,
                    (None, None) => continue,
                }
            };
            let old_file = diff.file(path, old_entry)?;
            let new_file = diff.file(path, new_entry)?;
            diff.deltas.push(Delta {
                status,
                old_file,
                new_file,
                similarity: None,
            });
        }

        if options.detect_renames || options.detect_copies {
            let mut deltas = std::mem::take(&mut diff.deltas);
            rename::detect(&mut deltas, options, &|file| diff.content(file))?;
            diff.deltas = deltas;
        }
        if !options.include_unmodified {
            diff.deltas.retain(|d| d.status != DeltaStatus::Unmodified);
        }
        diff.deltas.sort_by(|a, b| a.path().cmp(b.path()));
        debug!(deltas = diff.deltas.len(), "diff computed");
        Ok(diff)
    }

    fn file(&self, path: &str, entry: Option<&SideEntry>) -> Result<DiffFile> {
        let Some(entry) = entry else {
            return Ok(DiffFile {
                path: path.to_string(),
                mode: None,
                oid: Oid::zero(self.odb.algorithm()),
                size: 0,
            });
        };
        let size = if let Some(content) = self.blobs.get(&entry.oid) {
            content.len() as u64
        } else if entry.mode.is_gitlink() || entry.state == EntryState::Unreadable {
            0
        } else {
            self.odb.read_header(&entry.oid)?.1 as u64
        };
        Ok(DiffFile {
            path: path.to_string(),
            mode: Some(entry.mode),
            oid: entry.oid,
            size,
        })
    }

    /// Content of one side of a delta; empty when the side is absent.
    pub fn content(&self, file: &DiffFile) -> Result<Arc<[u8]>> {
        match file.mode {
            None => Ok(Arc::from(&b""[..])),
            Some(mode) if mode.is_gitlink() => {
                Ok(Arc::from(format!("Subproject commit {}\n", file.oid).as_bytes()))
            }
            Some(_) => match self.blobs.get(&file.oid) {
                Some(content) => Ok(content.clone()),
                None if file.oid.is_zero() => Ok(Arc::from(&b""[..])),
                None => Ok(self.odb.read(&file.oid)?.data),
            },
        }
    }

    pub fn deltas(&self) -> &[Delta] {
        &self.deltas
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Delta> {
        self.deltas.iter()
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    pub(crate) fn odb(&self) -> &Odb {
        self.odb
    }

    /// Working-tree blobs referenced by the deltas.
    pub(crate) fn pending_blobs(&self) -> impl Iterator<Item = (&Oid, &Arc<[u8]>)> {
        self.blobs.iter()
    }

    /// Line-level patch for delta `i`.
    pub fn patch(&self, i: usize) -> Result<Patch> {
        let delta = self
            .deltas
            .get(i)
            .ok_or_else(|| Error::not_found("delta", i))?
            .clone();
        let old = self.content(&delta.old_file)?;
        let new = self.content(&delta.new_file)?;
        let classifier = &self.options.classifier;
        let binary = classifier.is_binary(&delta.old_file.path, &old)
            || classifier.is_binary(&delta.new_file.path, &new);
        if binary || delta.status == DeltaStatus::Unreadable {
            return Ok(Patch {
                binary: old != new,
                delta,
                hunks: Vec::new(),
            });
        }
        let old_lines = lines::split_lines(&old);
        let new_lines = lines::split_lines(&new);
        let ops = lines::diff_lines(
            &old_lines,
            &new_lines,
            self.options.algorithm,
            self.options.whitespace,
        );
        let hunks = patch::build_hunks(
            &old_lines,
            &new_lines,
            &ops,
            self.options.context_lines as usize,
            self.options.interhunk_lines as usize,
        );
        Ok(Patch {
            delta,
            binary: false,
            hunks,
        })
    }

    pub fn patches(&self) -> Result<Vec<Patch>> {
        (0..self.deltas.len()).map(|i| self.patch(i)).collect()
    }

    pub fn stats(&self) -> Result<DiffStats> {
        let mut stats = DiffStats::default();
        for i in 0..self.deltas.len() {
            cancel::check(self.options.cancel.as_ref())?;
            if matches!(
                self.deltas[i].status,
                DeltaStatus::Unmodified | DeltaStatus::Ignored
            ) {
                continue;
            }
            let patch = self.patch(i)?;
            stats.files_changed += 1;
            stats.insertions += patch.additions();
            stats.deletions += patch.deletions();
        }
        Ok(stats)
    }

    /// Unified diff of every delta.
    pub fn to_patch_text(&self, abbrev: usize) -> Result<String> {
        let mut out = String::new();
        for i in 0..self.deltas.len() {
            if self.deltas[i].status == DeltaStatus::Unmodified {
                continue;
            }
            out.push_str(&self.patch(i)?.to_text(abbrev));
        }
        Ok(out)
    }

    /// `M\tpath`, `R087\told\tnew` lines.
    pub fn to_name_status(&self) -> String {
        let mut out = String::new();
        for delta in &self.deltas {
            match delta.status {
                DeltaStatus::Renamed | DeltaStatus::Copied => {
                    out.push_str(&format!(
                        "{}{:03}\t{}\t{}\n",
                        delta.status,
                        delta.similarity.unwrap_or(100),
                        delta.old_file.path,
                        delta.new_file.path
                    ));
                }
                _ => out.push_str(&format!("{}\t{}\n", delta.status, delta.path())),
            }
        }
        out
    }
}

impl<'d, 'a> IntoIterator for &'d Diff<'a> {
    type Item = &'d Delta;
    type IntoIter = std::slice::Iter<'d, Delta>;

    fn into_iter(self) -> Self::IntoIter {
        self.deltas.iter()
    }
}

/// Compare two trees. `None` stands for the empty tree.
pub fn tree_to_tree<'a>(
    odb: &'a Odb,
    old: Option<&Oid>,
    new: Option<&Oid>,
    options: &DiffOptions,
) -> Result<Diff<'a>> {
    let keep_unchanged = options.include_unmodified || options.detect_copies;
    let (old, new) = Snapshot::tree_pair(odb, old, new, keep_unchanged)?;
    Diff::build(odb, old, new, options, HashMap::new())
}

/// Compare a tree with the index (what would be committed).
pub fn tree_to_index<'a>(
    odb: &'a Odb,
    tree: Option<&Oid>,
    index: &Index,
    options: &DiffOptions,
) -> Result<Diff<'a>> {
    let old = Snapshot::tree(odb, tree)?;
    let new = Snapshot::index(index);
    Diff::build(odb, old, new, options, HashMap::new())
}

/// Compare the index with a working-tree snapshot.
pub fn index_to_workdir<'a>(
    odb: &'a Odb,
    index: &Index,
    source: &dyn WorkdirSource,
    options: &DiffOptions,
) -> Result<Diff<'a>> {
    let mut blobs = HashMap::new();
    let old = Snapshot::index(index);
    let new = Snapshot::workdir(odb, source, options, &mut blobs)?;
    Diff::build(odb, old, new, options, blobs)
}

/// Compare a tree with a working-tree snapshot, bypassing the index.
pub fn tree_to_workdir<'a>(
    odb: &'a Odb,
    tree: Option<&Oid>,
    source: &dyn WorkdirSource,
    options: &DiffOptions,
) -> Result<Diff<'a>> {
    let mut blobs = HashMap::new();
    let old = Snapshot::tree(odb, tree)?;
    let new = Snapshot::workdir(odb, source, options, &mut blobs)?;
    Diff::build(odb, old, new, options, blobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::HashAlgorithm;
    use crate::error::ErrorKind;
    use crate::object::TreeUpdater;

    fn odb() -> Odb {
        Odb::in_memory(HashAlgorithm::Sha1)
    }

    fn tree(odb: &Odb, files: &[(&str, &[u8])]) -> Oid {
        let mut updater = TreeUpdater::new(odb);
        for (path, content) in files {
            let oid = odb.write_blob(content).unwrap();
            updater.upsert(*path, FileMode::Blob, oid);
        }
        updater.apply(None).unwrap()
    }

    fn statuses(diff: &Diff<'_>) -> Vec<(DeltaStatus, String)> {
        diff.iter()
            .map(|d| (d.status, d.path().to_string()))
            .collect()
    }

    #[test]
    fn tree_against_itself_is_empty() {
        let odb = odb();
        let t = tree(&odb, &[("a", b"1\n"), ("dir/b", b"2\n")]);
        let diff = tree_to_tree(&odb, Some(&t), Some(&t), &DiffOptions::default()).unwrap();
        assert!(diff.is_empty());

        let opts = DiffOptions {
            include_unmodified: true,
            ..DiffOptions::default()
        };
        let diff = tree_to_tree(&odb, Some(&t), Some(&t), &opts).unwrap();
        assert_eq!(diff.len(), 2);
        assert!(diff.iter().all(|d| d.status == DeltaStatus::Unmodified));
    }

    #[test]
    fn classifies_changes_in_path_order() {
        let odb = odb();
        let old = tree(&odb, &[("a", b"1\n"), ("b", b"2\n"), ("c", b"3\n")]);
        let new = tree(&odb, &[("a", b"1\n"), ("b", b"two\n"), ("d/e", b"4\n")]);
        let opts = DiffOptions {
            detect_renames: false,
            ..DiffOptions::default()
        };
        let diff = tree_to_tree(&odb, Some(&old), Some(&new), &opts).unwrap();
        assert_eq!(
            statuses(&diff),
            vec![
                (DeltaStatus::Modified, "b".into()),
                (DeltaStatus::Deleted, "c".into()),
                (DeltaStatus::Added, "d/e".into()),
            ]
        );
        assert_eq!(diff.to_name_status(), "M\tb\nD\tc\nA\td/e\n");
    }

    #[test]
    fn typechange_and_mode_change() {
        let odb = odb();
        let blob = odb.write_blob(b"target").unwrap();
        let old = TreeUpdater::new(&odb)
            .upsert("link", FileMode::Blob, blob)
            .upsert("run.sh", FileMode::Blob, blob)
            .apply(None)
            .unwrap();
        let new = TreeUpdater::new(&odb)
            .upsert("link", FileMode::Link, blob)
            .upsert("run.sh", FileMode::BlobExecutable, blob)
            .apply(None)
            .unwrap();
        let diff = tree_to_tree(&odb, Some(&old), Some(&new), &DiffOptions::default()).unwrap();
        assert_eq!(
            statuses(&diff),
            vec![
                (DeltaStatus::TypeChanged, "link".into()),
                (DeltaStatus::Modified, "run.sh".into()),
            ]
        );
        let text = diff.to_patch_text(7).unwrap();
        assert!(text.contains("old mode 100644\nnew mode 100755"));
    }

    #[test]
    fn exact_and_similar_renames() {
        let odb = odb();
        let body = b"line 1\nline 2\nline 3\nline 4\n";
        let old = tree(&odb, &[("old.txt", body), ("keep.txt", b"k\n"), ("src.rs", b"a\nb\nc\nd\n")]);
        let new = tree(
            &odb,
            &[("new.txt", body), ("keep.txt", b"k\n"), ("dst.rs", b"a\nb\nc\nx\n")],
        );
        let diff = tree_to_tree(&odb, Some(&old), Some(&new), &DiffOptions::default()).unwrap();
        let deltas = diff.deltas();
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].status, DeltaStatus::Renamed);
        assert_eq!(deltas[0].old_file.path, "src.rs");
        assert_eq!(deltas[0].new_file.path, "dst.rs");
        assert_eq!(deltas[0].similarity, Some(75));
        assert_eq!(deltas[1].new_file.path, "new.txt");
        assert_eq!(deltas[1].similarity, Some(100));
        assert!(diff.to_name_status().contains("R100\told.txt\tnew.txt\n"));

        let text = diff.to_patch_text(7).unwrap();
        assert!(text.contains("rename from src.rs\nrename to dst.rs"));
    }

    #[test]
    fn equal_subtrees_are_not_read() {
        let odb = odb();
        let old = tree(&odb, &[("shared/x", b"1\n"), ("top", b"a\n")]);
        let new = tree(&odb, &[("shared/x", b"1\n"), ("top", b"b\n")]);
        let shared = odb.find_tree(&old).unwrap().get("shared").unwrap().oid;

        // A diff that had to read `shared` would fail once it is gone.
        let pruned = Odb::in_memory(HashAlgorithm::Sha1);
        for oid in [old, new] {
            let raw = odb.read(&oid).unwrap();
            pruned.write(raw.kind, &raw.data).unwrap();
        }
        for content in [&b"a\n"[..], b"b\n"] {
            pruned.write_blob(content).unwrap();
        }
        assert!(!pruned.exists(&shared).unwrap());
        let diff = tree_to_tree(&pruned, Some(&old), Some(&new), &DiffOptions::default()).unwrap();
        assert_eq!(statuses(&diff), vec![(DeltaStatus::Modified, "top".into())]);
    }

    #[test]
    fn empty_files_never_pair_as_renames() {
        let odb = odb();
        let old = tree(&odb, &[("a", b"")]);
        let new = tree(&odb, &[("b", b"")]);
        let diff = tree_to_tree(&odb, Some(&old), Some(&new), &DiffOptions::default()).unwrap();
        assert_eq!(
            statuses(&diff),
            vec![(DeltaStatus::Deleted, "a".into()), (DeltaStatus::Added, "b".into())]
        );
    }

    #[test]
    fn rename_threshold_applies() {
        let odb = odb();
        let old = tree(&odb, &[("a", b"1\n2\n3\n4\n")]);
        let new = tree(&odb, &[("b", b"1\n9\n8\n7\n")]);
        let diff = tree_to_tree(&odb, Some(&old), Some(&new), &DiffOptions::default()).unwrap();
        assert_eq!(diff.len(), 2);
        let opts = DiffOptions {
            rename_threshold: 25,
            ..DiffOptions::default()
        };
        let diff = tree_to_tree(&odb, Some(&old), Some(&new), &opts).unwrap();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.deltas()[0].status, DeltaStatus::Renamed);
    }

    #[test]
    fn copies_from_unmodified_sources() {
        let odb = odb();
        let body: &[u8] = b"shared\ncontent\n";
        let old = tree(&odb, &[("orig", body)]);
        let new = tree(&odb, &[("copy", body), ("orig", body)]);
        let opts = DiffOptions {
            detect_copies: true,
            ..DiffOptions::default()
        };
        let diff = tree_to_tree(&odb, Some(&old), Some(&new), &opts).unwrap();
        assert_eq!(statuses(&diff), vec![(DeltaStatus::Copied, "copy".into())]);
        assert_eq!(diff.deltas()[0].old_file.path, "orig");
    }

    #[test]
    fn pathspec_and_reverse() {
        let odb = odb();
        let old = tree(&odb, &[("src/a", b"1\n"), ("docs/b", b"2\n")]);
        let new = tree(&odb, &[("src/a", b"2\n")]);
        let opts = DiffOptions {
            pathspec: vec!["src".into()],
            ..DiffOptions::default()
        };
        let diff = tree_to_tree(&odb, Some(&old), Some(&new), &opts).unwrap();
        assert_eq!(statuses(&diff), vec![(DeltaStatus::Modified, "src/a".into())]);

        let opts = DiffOptions {
            reverse: true,
            detect_renames: false,
            ..DiffOptions::default()
        };
        let diff = tree_to_tree(&odb, Some(&old), Some(&new), &opts).unwrap();
        assert_eq!(
            statuses(&diff),
            vec![
                (DeltaStatus::Added, "docs/b".into()),
                (DeltaStatus::Modified, "src/a".into()),
            ]
        );
    }

    #[test]
    fn index_and_workdir_inputs() {
        let odb = odb();
        let base = tree(&odb, &[("a", b"1\n"), ("b", b"2\n")]);
        let mut index = Index::from_tree(&odb, &base).unwrap();
        let staged = odb.write_blob(b"staged\n").unwrap();
        index.add("c", FileMode::Blob, staged).unwrap();
        let ours = odb.write_blob(b"ours\n").unwrap();
        index
            .add_conflict("b", None, Some((FileMode::Blob, ours)), None)
            .unwrap();

        let opts = DiffOptions {
            detect_renames: false,
            ..DiffOptions::default()
        };
        let diff = tree_to_index(&odb, Some(&base), &index, &opts).unwrap();
        assert_eq!(
            statuses(&diff),
            vec![
                (DeltaStatus::Conflicted, "b".into()),
                (DeltaStatus::Added, "c".into()),
            ]
        );

        let mut workdir = MemoryWorkdir::new();
        workdir.insert("a", FileMode::Blob, b"1\nmore\n").unwrap();
        workdir.insert("c", FileMode::Blob, b"staged\n").unwrap();
        workdir.insert("new", FileMode::Blob, b"n\n").unwrap();
        workdir.insert("target/out", FileMode::Blob, b"o\n").unwrap();
        workdir.insert_unreadable("locked", FileMode::Blob);
        let opts = DiffOptions {
            detect_renames: false,
            include_untracked: true,
            include_ignored: true,
            classifier: Arc::new(PrefixIgnore::new(["target/"])),
            ..DiffOptions::default()
        };
        let diff = index_to_workdir(&odb, &index, &workdir, &opts).unwrap();
        assert_eq!(
            statuses(&diff),
            vec![
                (DeltaStatus::Modified, "a".into()),
                (DeltaStatus::Conflicted, "b".into()),
                (DeltaStatus::Unreadable, "locked".into()),
                (DeltaStatus::Untracked, "new".into()),
                (DeltaStatus::Ignored, "target/out".into()),
            ]
        );
        let patch = diff.patch(0).unwrap();
        assert_eq!(patch.additions(), 1);
        assert_eq!(patch.deletions(), 0);
    }

    #[test]
    fn patch_text_and_stats() {
        let odb = odb();
        let old = tree(&odb, &[("f", b"a\nb\nc\n")]);
        let new = tree(&odb, &[("f", b"a\nB\nc\nd")]);
        let diff = tree_to_tree(&odb, Some(&old), Some(&new), &DiffOptions::default()).unwrap();
        let text = diff.to_patch_text(7).unwrap();
        assert!(text.starts_with("diff --git a/f b/f\nindex "));
        assert!(text.contains("--- a/f\n+++ b/f\n@@ -1,3 +1,4 @@\n a\n-b\n+B\n c\n+d\n\\ No newline at end of file\n"));
        assert_eq!(
            diff.stats().unwrap(),
            DiffStats {
                files_changed: 1,
                insertions: 2,
                deletions: 1
            }
        );
    }

    #[test]
    fn binary_content_has_no_hunks() {
        let odb = odb();
        let old = tree(&odb, &[("bin", b"\0\x01")]);
        let new = tree(&odb, &[("bin", b"\0\x02")]);
        let diff = tree_to_tree(&odb, Some(&old), Some(&new), &DiffOptions::default()).unwrap();
        let patch = diff.patch(0).unwrap();
        assert!(patch.binary);
        assert!(patch.to_text(7).contains("Binary files a/bin and b/bin differ"));
    }

    #[test]
    fn cancelled_diff_is_interrupted() {
        let odb = odb();
        let t = tree(&odb, &[("a", b"1\n")]);
        let token = CancelToken::new();
        token.cancel();
        let opts = DiffOptions {
            cancel: Some(token),
            ..DiffOptions::default()
        };
        let err = tree_to_tree(&odb, None, Some(&t), &opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interrupted);
    }
}
