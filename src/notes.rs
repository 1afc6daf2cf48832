//! notes
//!
//! Annotations attached to objects without rewriting them.
//!
//! A notes reference (by default `refs/notes/commits`) points at a commit
//! whose tree maps the hex id of each annotated object to a blob holding
//! the note. Every change writes a new notes commit on top of the old tip,
//! so the notes themselves have history. Trees written elsewhere may split
//! the hex name into fanout directories (`ab/cdef...`); both layouts are
//! read, and writes always use the flat layout.

use tracing::debug;

use crate::core::types::{FileMode, Oid, RefName, Signature};
use crate::error::{Error, ErrorKind, Result};
use crate::object::{Commit, TreeUpdater};
use crate::odb::Odb;
use crate::refs::{ensure_trailing_newline, RefStore};

/// A note as read from the current notes tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// Blob holding the note text.
    pub id: Oid,
    /// Object the note annotates.
    pub target: Oid,
    pub message: Vec<u8>,
    /// Author and committer of the notes commit the note was read from.
    pub author: Signature,
    pub committer: Signature,
}

impl Note {
    pub fn message_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }
}

/// Handle on one notes reference.
#[derive(Debug)]
pub struct Notes<'r> {
    odb: &'r Odb,
    refs: &'r RefStore,
    notes_ref: RefName,
}

impl<'r> Notes<'r> {
    pub fn new(odb: &'r Odb, refs: &'r RefStore, notes_ref: RefName) -> Self {
        Self {
            odb,
            refs,
            notes_ref,
        }
    }

    pub fn notes_ref(&self) -> &RefName {
        &self.notes_ref
    }

    /// Current notes commit, `None` before the first note is written.
    pub fn tip(&self) -> Result<Option<Oid>> {
        match self.refs.resolve(&self.notes_ref) {
            Ok(oid) => Ok(Some(oid)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Note attached to `target`.
    ///
    /// # Errors
    ///
    /// `NotFound` when `target` has no note.
    pub fn read(&self, target: &Oid) -> Result<Note> {
        let missing = || Error::not_found("note", target);
        let tip = self.tip()?.ok_or_else(missing)?;
        let commit = self.odb.find_commit(&tip)?;
        let (_, id) = locate(self.odb, &commit.tree, target)?.ok_or_else(missing)?;
        let blob = self.odb.find_blob(&id)?;
        Ok(Note {
            id,
            target: *target,
            message: blob.data,
            author: commit.author,
            committer: commit.committer,
        })
    }

    /// Attach `message` to `target`, returning the note blob's id.
    ///
    /// # Errors
    ///
    /// - `Conflict` (`Exists`) if `target` already has a note and `force` is off
    /// - `Conflict` (`CasFailed`) if the notes reference moved concurrently
    pub fn create(
        &self,
        author: &Signature,
        committer: &Signature,
        target: &Oid,
        message: &str,
        force: bool,
    ) -> Result<Oid> {
        let tip = self.tip()?;
        let (base_tree, parents) = self.base(tip)?;

        let mut updater = TreeUpdater::new(self.odb);
        if let Some(tree) = &base_tree {
            if let Some((path, _)) = locate(self.odb, tree, target)? {
                if !force {
                    return Err(Error::Exists {
                        what: "note",
                        name: target.to_hex(),
                    });
                }
                updater.remove(path);
            }
        }
        let blob = self.odb.write_blob(ensure_trailing_newline(message).as_bytes())?;
        updater.upsert(target.to_hex(), FileMode::Blob, blob);
        let tree = updater.apply(base_tree.as_ref())?;

        let summary = format!("Notes added for {}\n", target.to_hex());
        self.commit(tip, tree, parents, author, committer, &summary)?;
        debug!(notes_ref = %self.notes_ref, %target, note = %blob, "note written");
        Ok(blob)
    }

    /// Drop the note on `target`, returning the new notes commit.
    ///
    /// # Errors
    ///
    /// `NotFound` when `target` has no note.
    pub fn remove(&self, author: &Signature, committer: &Signature, target: &Oid) -> Result<Oid> {
        let missing = || Error::not_found("note", target);
        let tip = self.tip()?;
        let (base_tree, parents) = self.base(tip)?;
        let tree = base_tree.ok_or_else(missing)?;
        let (path, _) = locate(self.odb, &tree, target)?.ok_or_else(missing)?;

        let tree = TreeUpdater::new(self.odb).remove(path).apply(Some(&tree))?;
        let summary = format!("Notes removed for {}\n", target.to_hex());
        let commit = self.commit(tip, tree, parents, author, committer, &summary)?;
        debug!(notes_ref = %self.notes_ref, %target, "note removed");
        Ok(commit)
    }

    /// Every `(note blob, annotated object)` pair, in annotated-id order.
    ///
    /// Tree entries whose path is not a hex object id are skipped.
    pub fn iter(&self) -> Result<NoteIter> {
        let entries: Vec<(String, Oid)> = match self.tip()? {
            Some(tip) => {
                let tree = self.odb.find_commit(&tip)?.tree;
                crate::object::tree::flatten(self.odb, &tree)?
                    .into_iter()
                    .map(|(path, entry)| (path, entry.oid))
                    .collect()
            }
            None => Vec::new(),
        };
        Ok(NoteIter {
            entries: entries.into_iter(),
        })
    }

    fn base(&self, tip: Option<Oid>) -> Result<(Option<Oid>, Vec<Oid>)> {
        match tip {
            Some(tip) => Ok((Some(self.odb.find_commit(&tip)?.tree), vec![tip])),
            None => Ok((None, Vec::new())),
        }
    }

    fn commit(
        &self,
        tip: Option<Oid>,
        tree: Oid,
        parents: Vec<Oid>,
        author: &Signature,
        committer: &Signature,
        message: &str,
    ) -> Result<Oid> {
        let commit = Commit::new(tree, parents, author.clone(), committer.clone(), message);
        let oid = self.odb.write_commit(&commit)?;
        let reflog = format!("notes: {}", message.trim_end());
        self.refs
            .compare_and_swap(&self.notes_ref, tip, oid, &reflog)?;
        Ok(oid)
    }
}

/// Iterator over a snapshot of the notes tree.
#[derive(Debug)]
pub struct NoteIter {
    entries: std::vec::IntoIter<(String, Oid)>,
}

impl Iterator for NoteIter {
    type Item = Result<(Oid, Oid)>;

    fn next(&mut self) -> Option<Self::Item> {
        for (path, note) in self.entries.by_ref() {
            let hex: String = path.chars().filter(|c| *c != '/').collect();
            if let Ok(target) = Oid::from_hex(&hex) {
                return Some(Ok((note, target)));
            }
        }
        None
    }
}

/// Path and blob of the note on `target` below `tree`, following fanout
/// directories.
fn locate(odb: &Odb, tree: &Oid, target: &Oid) -> Result<Option<(String, Oid)>> {
    let hex = target.to_hex();
    let mut rest = hex.as_str();
    let mut prefix = String::new();
    let mut current = odb.find_tree(tree)?;
    loop {
        if let Some(entry) = current.get(rest).filter(|e| !e.is_tree()) {
            return Ok(Some((format!("{prefix}{rest}"), entry.oid)));
        }
        if rest.len() <= 2 {
            return Ok(None);
        }
        let (dir, tail) = rest.split_at(2);
        match current.get(dir).filter(|e| e.is_tree()) {
            Some(entry) => {
                current = odb.find_tree(&entry.oid)?;
                prefix.push_str(dir);
                prefix.push('/');
                rest = tail;
            }
            None => return Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{HashAlgorithm, Time};

    struct Fixture {
        odb: Odb,
        refs: RefStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                odb: Odb::in_memory(HashAlgorithm::Sha1),
                refs: RefStore::in_memory(HashAlgorithm::Sha1),
            }
        }

        fn notes(&self) -> Notes<'_> {
            let name = RefName::new("refs/notes/commits").unwrap();
            Notes::new(&self.odb, &self.refs, name)
        }

        fn object(&self, text: &str) -> Oid {
            self.odb.write_blob(text.as_bytes()).unwrap()
        }
    }

    fn sig() -> Signature {
        Signature::new("Ada", "ada@example.com", Time::new(100, 0)).unwrap()
    }

    #[test]
    fn create_then_read() {
        let fx = Fixture::new();
        let notes = fx.notes();
        let target = fx.object("annotated");

        let blob = notes.create(&sig(), &sig(), &target, "reviewed", false).unwrap();
        let note = notes.read(&target).unwrap();
        assert_eq!(note.id, blob);
        assert_eq!(note.target, target);
        assert_eq!(note.message, b"reviewed\n");
        assert_eq!(note.author, sig());
    }

    #[test]
    fn missing_note_is_not_found() {
        let fx = Fixture::new();
        let notes = fx.notes();
        let target = fx.object("x");
        assert_eq!(notes.read(&target).unwrap_err().kind(), ErrorKind::NotFound);

        notes.create(&sig(), &sig(), &fx.object("y"), "other", false).unwrap();
        assert_eq!(notes.read(&target).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn second_note_needs_force() {
        let fx = Fixture::new();
        let notes = fx.notes();
        let target = fx.object("x");
        notes.create(&sig(), &sig(), &target, "one", false).unwrap();

        let err = notes.create(&sig(), &sig(), &target, "two", false).unwrap_err();
        assert!(matches!(err, Error::Exists { what: "note", .. }));
        assert_eq!(notes.read(&target).unwrap().message, b"one\n");

        notes.create(&sig(), &sig(), &target, "two", true).unwrap();
        assert_eq!(notes.read(&target).unwrap().message, b"two\n");
    }

    #[test]
    fn each_change_is_a_commit_on_the_old_tip() {
        let fx = Fixture::new();
        let notes = fx.notes();
        let target = fx.object("x");

        notes.create(&sig(), &sig(), &target, "one", false).unwrap();
        let first = notes.tip().unwrap().unwrap();
        assert!(fx.odb.find_commit(&first).unwrap().parents.is_empty());

        let second = notes.remove(&sig(), &sig(), &target).unwrap();
        assert_eq!(notes.tip().unwrap(), Some(second));
        let commit = fx.odb.find_commit(&second).unwrap();
        assert_eq!(commit.parents, vec![first]);
        assert!(fx.odb.find_tree(&commit.tree).unwrap().is_empty());
    }

    #[test]
    fn remove_missing_note_is_not_found() {
        let fx = Fixture::new();
        let notes = fx.notes();
        let target = fx.object("x");
        let err = notes.remove(&sig(), &sig(), &target).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(notes.tip().unwrap(), None);
    }

    #[test]
    fn iter_yields_note_and_target() {
        let fx = Fixture::new();
        let notes = fx.notes();
        assert_eq!(notes.iter().unwrap().count(), 0);

        let a = fx.object("a");
        let b = fx.object("b");
        let na = notes.create(&sig(), &sig(), &a, "on a", false).unwrap();
        let nb = notes.create(&sig(), &sig(), &b, "on b", false).unwrap();

        let mut got: Vec<(Oid, Oid)> = notes.iter().unwrap().map(Result::unwrap).collect();
        got.sort_by_key(|(_, target)| target.to_hex());
        let mut want = vec![(na, a), (nb, b)];
        want.sort_by_key(|(_, target)| target.to_hex());
        assert_eq!(got, want);
    }

    #[test]
    fn fanout_trees_are_read_and_rewritten_flat() {
        let fx = Fixture::new();
        let target = fx.object("fanned");
        let hex = target.to_hex();
        let old_note = fx.object("old\n");

        let tree = TreeUpdater::new(&fx.odb)
            .upsert(format!("{}/{}", &hex[..2], &hex[2..]), FileMode::Blob, old_note)
            .upsert("README", FileMode::Blob, fx.object("not a note"))
            .apply(None)
            .unwrap();
        let tip = fx
            .odb
            .write_commit(&Commit::new(tree, vec![], sig(), sig(), "seed\n"))
            .unwrap();
        let name = RefName::new("refs/notes/commits").unwrap();
        fx.refs.compare_and_swap(&name, None, tip, "seed").unwrap();

        let notes = fx.notes();
        assert_eq!(notes.read(&target).unwrap().id, old_note);
        let listed: Vec<(Oid, Oid)> = notes.iter().unwrap().map(Result::unwrap).collect();
        assert_eq!(listed, vec![(old_note, target)]);

        notes.create(&sig(), &sig(), &target, "new", true).unwrap();
        let tree = fx.odb.find_commit(&notes.tip().unwrap().unwrap()).unwrap().tree;
        let tree = fx.odb.find_tree(&tree).unwrap();
        assert!(tree.get(&hex[..2]).is_none());
        assert!(tree.get(&hex).is_some());
        assert_eq!(notes.read(&target).unwrap().message, b"new\n");
    }
}
