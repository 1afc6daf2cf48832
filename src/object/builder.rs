//! object::builder
//!
//! Construct new trees.
//!
//! [`TreeBuilder`] edits the entries of a single directory level and
//! writes a canonical tree. [`TreeUpdater`] applies path-level edits
//! (`src/lib.rs`) to a whole hierarchy, rewriting only the directories on
//! the edited paths; every untouched subtree keeps its id.
//!
//! A builder is single-owner. Independent builders over the same [`Odb`]
//! may run concurrently.

use std::collections::BTreeMap;

use tracing::debug;

use super::tree::{validate_entry_name, Tree, TreeEntry};
use crate::core::types::{FileMode, Oid};
use crate::error::{Error, ErrorKind, Result};
use crate::odb::Odb;

/// Staged edits of one tree level.
#[derive(Debug)]
pub struct TreeBuilder<'a> {
    odb: &'a Odb,
    entries: BTreeMap<String, TreeEntry>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(odb: &'a Odb) -> Self {
        Self {
            odb,
            entries: BTreeMap::new(),
        }
    }

    /// Builder pre-seeded with the entries of `tree`.
    pub fn from_tree(odb: &'a Odb, tree: &Tree) -> Self {
        Self {
            odb,
            entries: tree
                .iter()
                .map(|entry| (entry.name.clone(), entry.clone()))
                .collect(),
        }
    }

    pub fn from_oid(odb: &'a Odb, tree: &Oid) -> Result<Self> {
        Ok(Self::from_tree(odb, &odb.find_tree(tree)?))
    }

    /// Add or replace an entry, returning the one it replaced.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        mode: FileMode,
        oid: Oid,
    ) -> Result<Option<TreeEntry>> {
        let name = name.into();
        validate_entry_name(&name)?;
        let entry = TreeEntry::new(name.clone(), mode, oid);
        Ok(self.entries.insert(name, entry))
    }

    /// Remove an entry, failing with `NotFound` when there is none.
    pub fn remove(&mut self, name: &str) -> Result<TreeEntry> {
        self.entries
            .remove(name)
            .ok_or_else(|| Error::not_found("tree entry", name))
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn filter(&mut self, mut keep: impl FnMut(&TreeEntry) -> bool) {
        self.entries.retain(|_, entry| keep(entry));
    }

    /// The staged entries as a canonical tree, without touching the store.
    pub fn build(&self) -> Tree {
        Tree::new(self.entries.values().cloned().collect())
    }

    /// Check every target and persist the tree.
    ///
    /// # Errors
    ///
    /// - `DanglingReference` if a target is missing from the store
    ///   (gitlinks are exempt: their commits live in another repository)
    /// - `InvalidTarget` if a target's type disagrees with its mode
    pub fn write(&self) -> Result<Oid> {
        for entry in self.entries.values() {
            if entry.mode.is_gitlink() {
                continue;
            }
            let (actual, _) = match self.odb.read_header(&entry.oid) {
                Ok(header) => header,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return Err(Error::DanglingReference {
                        from: format!("tree entry '{}'", entry.name),
                        missing: entry.oid,
                    })
                }
                Err(err) => return Err(err),
            };
            let expected = entry.mode.object_type();
            if actual != expected {
                return Err(Error::InvalidTarget {
                    oid: entry.oid,
                    expected,
                    actual,
                });
            }
        }
        let oid = self.odb.write_tree(&self.build())?;
        debug!(%oid, entries = self.entries.len(), "wrote tree");
        Ok(oid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Update {
    Upsert { mode: FileMode, oid: Oid },
    Remove,
}

/// Path-level edits applied to a tree hierarchy.
///
/// ```
/// use grove::core::types::{FileMode, HashAlgorithm};
/// use grove::object::TreeUpdater;
/// use grove::odb::Odb;
///
/// let odb = Odb::in_memory(HashAlgorithm::Sha1);
/// let blob = odb.write_blob(b"fn main() {}\n")?;
/// let root = TreeUpdater::new(&odb)
///     .upsert("src/main.rs", FileMode::Blob, blob)
///     .apply(None)?;
/// let tree = odb.find_tree(&root)?;
/// assert!(tree.entry_by_path(&odb, "src/main.rs")?.is_some());
/// # Ok::<(), grove::Error>(())
/// ```
#[derive(Debug)]
pub struct TreeUpdater<'a> {
    odb: &'a Odb,
    updates: Vec<(String, Update)>,
}

impl<'a> TreeUpdater<'a> {
    pub fn new(odb: &'a Odb) -> Self {
        Self {
            odb,
            updates: Vec::new(),
        }
    }

    /// Create or replace the file at `path`.
    pub fn upsert(&mut self, path: impl Into<String>, mode: FileMode, oid: Oid) -> &mut Self {
        self.updates.push((path.into(), Update::Upsert { mode, oid }));
        self
    }

    /// Remove `path` (file or directory). Missing paths are ignored.
    pub fn remove(&mut self, path: impl Into<String>) -> &mut Self {
        self.updates.push((path.into(), Update::Remove));
        self
    }

    /// Apply the edits to `base` (None = empty tree) and write the new root.
    ///
    /// Directories left empty are dropped; the root is always written.
    pub fn apply(&self, base: Option<&Oid>) -> Result<Oid> {
        let mut edits = Vec::with_capacity(self.updates.len());
        for (path, update) in &self.updates {
            let components: Vec<&str> = path.split('/').collect();
            if components.iter().any(|c| validate_entry_name(c).is_err()) {
                return Err(Error::InvalidSpec(format!("invalid path '{path}'")));
            }
            edits.push((components, update));
        }
        match self.apply_level(base, &edits)? {
            Some(oid) => Ok(oid),
            None => TreeBuilder::new(self.odb).write(),
        }
    }

    fn apply_level(&self, base: Option<&Oid>, edits: &[(Vec<&str>, &Update)]) -> Result<Option<Oid>> {
        let mut builder = match base {
            Some(oid) => TreeBuilder::from_oid(self.odb, oid)?,
            None => TreeBuilder::new(self.odb),
        };

        let mut nested: BTreeMap<&str, Vec<(Vec<&str>, &Update)>> = BTreeMap::new();
        for (components, update) in edits {
            match components.as_slice() {
                [name] => match update {
                    Update::Upsert { mode, oid } => {
                        builder.insert(*name, *mode, *oid)?;
                    }
                    Update::Remove => {
                        if builder.get(name).is_some() {
                            builder.remove(name)?;
                        }
                    }
                },
                [dir, rest @ ..] => nested
                    .entry(*dir)
                    .or_default()
                    .push((rest.to_vec(), *update)),
                [] => {}
            }
        }

        for (dir, child_edits) in nested {
            let child_base = builder
                .get(dir)
                .filter(|entry| entry.is_tree())
                .map(|entry| entry.oid);
            match self.apply_level(child_base.as_ref(), &child_edits)? {
                Some(oid) => {
                    builder.insert(dir, FileMode::Tree, oid)?;
                }
                // A same-name file upserted above replaces the emptied directory.
                None => {
                    if builder.get(dir).is_some_and(|entry| entry.is_tree()) {
                        builder.remove(dir)?;
                    }
                }
            }
        }

        if builder.is_empty() {
            return Ok(None);
        }
        builder.write().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{HashAlgorithm, ObjectType};

    fn odb() -> Odb {
        Odb::in_memory(HashAlgorithm::Sha1)
    }

    #[test]
    fn insertion_order_does_not_change_id() {
        let odb = odb();
        let a = odb.write_blob(b"a").unwrap();
        let b = odb.write_blob(b"b").unwrap();

        let mut first = TreeBuilder::new(&odb);
        first.insert("z.txt", FileMode::Blob, a).unwrap();
        first.insert("a.txt", FileMode::Blob, b).unwrap();

        let mut second = TreeBuilder::new(&odb);
        second.insert("a.txt", FileMode::Blob, b).unwrap();
        second.insert("z.txt", FileMode::Blob, a).unwrap();

        assert_eq!(first.write().unwrap(), second.write().unwrap());
    }

    #[test]
    fn dangling_targets_are_rejected_except_gitlinks() {
        let odb = odb();
        let missing = odb.hash(ObjectType::Blob, b"never written");

        let mut builder = TreeBuilder::new(&odb);
        builder.insert("ghost", FileMode::Blob, missing).unwrap();
        let err = builder.write().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DanglingReference);

        builder.clear();
        builder.insert("submodule", FileMode::Commit, missing).unwrap();
        assert!(builder.write().is_ok());
    }

    #[test]
    fn mode_must_match_target_type() {
        let odb = odb();
        let blob = odb.write_blob(b"x").unwrap();
        let mut builder = TreeBuilder::new(&odb);
        builder.insert("dir", FileMode::Tree, blob).unwrap();
        assert_eq!(builder.write().unwrap_err().kind(), ErrorKind::InvalidTarget);
    }

    #[test]
    fn seeded_builder_edits_leave_original_untouched() {
        let odb = odb();
        let blob = odb.write_blob(b"x").unwrap();
        let mut builder = TreeBuilder::new(&odb);
        builder.insert("keep", FileMode::Blob, blob).unwrap();
        builder.insert("drop", FileMode::Blob, blob).unwrap();
        let original = builder.write().unwrap();

        let mut edit = TreeBuilder::from_oid(&odb, &original).unwrap();
        edit.remove("drop").unwrap();
        assert_eq!(edit.remove("drop").unwrap_err().kind(), ErrorKind::NotFound);
        edit.filter(|entry| entry.name != "nothing");
        assert_eq!(edit.len(), 1);
        let edited = edit.write().unwrap();

        assert_ne!(edited, original);
        assert_eq!(odb.find_tree(&original).unwrap().len(), 2);
        assert!(edit.get("keep").is_some());
    }

    #[test]
    fn invalid_names_are_rejected() {
        let odb = odb();
        let blob = odb.write_blob(b"x").unwrap();
        let mut builder = TreeBuilder::new(&odb);
        assert_eq!(
            builder.insert("a/b", FileMode::Blob, blob).unwrap_err().kind(),
            ErrorKind::InvalidSpec
        );
    }

    #[test]
    fn updater_shares_untouched_subtrees() {
        let odb = odb();
        let one = odb.write_blob(b"1").unwrap();
        let two = odb.write_blob(b"2").unwrap();

        let base = TreeUpdater::new(&odb)
            .upsert("docs/readme.md", FileMode::Blob, one)
            .upsert("src/lib.rs", FileMode::Blob, one)
            .apply(None)
            .unwrap();
        let next = TreeUpdater::new(&odb)
            .upsert("src/lib.rs", FileMode::Blob, two)
            .apply(Some(&base))
            .unwrap();

        let before = odb.find_tree(&base).unwrap();
        let after = odb.find_tree(&next).unwrap();
        assert_eq!(before.get("docs").unwrap().oid, after.get("docs").unwrap().oid);
        assert_ne!(before.get("src").unwrap().oid, after.get("src").unwrap().oid);
    }

    #[test]
    fn updater_drops_emptied_directories() {
        let odb = odb();
        let one = odb.write_blob(b"1").unwrap();
        let base = TreeUpdater::new(&odb)
            .upsert("a/b/c.txt", FileMode::Blob, one)
            .upsert("top.txt", FileMode::Blob, one)
            .apply(None)
            .unwrap();

        let next = TreeUpdater::new(&odb)
            .remove("a/b/c.txt")
            .remove("not/there")
            .apply(Some(&base))
            .unwrap();
        let tree = odb.find_tree(&next).unwrap();
        assert!(tree.get("a").is_none());
        assert!(tree.get("top.txt").is_some());

        let empty = TreeUpdater::new(&odb).remove("top.txt").apply(Some(&next)).unwrap();
        assert!(odb.find_tree(&empty).unwrap().is_empty());
    }

    #[test]
    fn updater_swaps_directory_and_file_of_same_name() {
        let odb = odb();
        let one = odb.write_blob(b"1").unwrap();
        let two = odb.write_blob(b"2").unwrap();
        let nested = TreeUpdater::new(&odb)
            .upsert("p/child", FileMode::Blob, one)
            .upsert("k", FileMode::Blob, one)
            .apply(None)
            .unwrap();

        // Directory to file, with the file edit listed first.
        let flat = TreeUpdater::new(&odb)
            .upsert("p", FileMode::Blob, two)
            .remove("p/child")
            .apply(Some(&nested))
            .unwrap();
        let tree = odb.find_tree(&flat).unwrap();
        let p = tree.get("p").unwrap();
        assert!(!p.is_tree());
        assert_eq!(p.oid, two);
        assert!(tree.get("k").is_some());

        // And back again.
        let back = TreeUpdater::new(&odb)
            .remove("p")
            .upsert("p/child", FileMode::Blob, one)
            .apply(Some(&flat))
            .unwrap();
        assert_eq!(back, nested);
    }

    #[test]
    fn updater_rejects_bad_paths() {
        let odb = odb();
        let one = odb.write_blob(b"1").unwrap();
        let err = TreeUpdater::new(&odb)
            .upsert("a//b", FileMode::Blob, one)
            .apply(None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSpec);
    }
}
