//! merge::tree
//!
//! Path-level three-way merge of trees.
//!
//! The three trees are flattened to `path -> (mode, id)` maps. Renames
//! detected on either side (ancestor to ours, ancestor to theirs) are
//! paired first; every remaining path is merged by comparing which
//! sides changed relative to the ancestor. Text files changed on both
//! sides go through [`merge_file`](super::merge_file).

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use super::file::{merge_file, MergeFileInput};
use super::{ConflictKind, MergeConflict, MergeFavor, MergeOptions, MergeOutcome};
use crate::core::cancel;
use crate::core::types::{FileMode, ModeClass, Oid};
use crate::diff::{self, DeltaStatus, DiffOptions};
use crate::error::Result;
use crate::index::Index;
use crate::object::tree::flatten;
use crate::odb::Odb;

type Side = Option<(FileMode, Oid)>;
type Files = BTreeMap<String, (FileMode, Oid)>;

#[derive(Debug)]
enum Resolution {
    Clean(FileMode, Oid),
    Deleted,
    Conflict {
        ancestor: Side,
        ours: Side,
        theirs: Side,
        conflict: MergeConflict,
    },
}

struct TreeMerge<'a> {
    odb: &'a Odb,
    options: &'a MergeOptions,
    ancestor: Files,
    ours: Files,
    theirs: Files,
    result: BTreeMap<String, Resolution>,
}

fn files(odb: &Odb, tree: Option<&Oid>) -> Result<Files> {
    let Some(tree) = tree else {
        return Ok(Files::new());
    };
    Ok(flatten(odb, tree)?
        .into_iter()
        .map(|(path, entry)| (path, (entry.mode, entry.oid)))
        .collect())
}

/// Renames from the ancestor to one side: `ancestor path -> new path`.
fn renames(
    odb: &Odb,
    ancestor: Option<&Oid>,
    side: &Oid,
    options: &MergeOptions,
) -> Result<HashMap<String, String>> {
    let opts = DiffOptions {
        detect_renames: true,
        rename_threshold: options.rename_threshold,
        cancel: options.cancel.clone(),
        ..DiffOptions::default()
    };
    let diff = diff::tree_to_tree(odb, ancestor, Some(side), &opts)?;
    Ok(diff
        .iter()
        .filter(|d| d.status == DeltaStatus::Renamed)
        .map(|d| (d.old_file.path.clone(), d.new_file.path.clone()))
        .collect())
}

fn conflict(kind: ConflictKind, path: &str) -> MergeConflict {
    MergeConflict {
        kind,
        path: path.to_string(),
        other_path: None,
        marked: None,
    }
}

impl<'a> TreeMerge<'a> {
    fn stage_conflict(&mut self, path: &str, ancestor: Side, ours: Side, theirs: Side, conflict: MergeConflict) {
        self.result.insert(
            path.to_string(),
            Resolution::Conflict {
                ancestor,
                ours,
                theirs,
                conflict,
            },
        );
    }

    /// Pair renames made on either side and merge each pair under its new name.
    fn merge_renames(
        &mut self,
        ours_renamed: &HashMap<String, String>,
        theirs_renamed: &HashMap<String, String>,
        handled: &mut HashSet<String>,
    ) -> Result<()> {
        let sources: BTreeSet<&String> = ours_renamed.keys().chain(theirs_renamed.keys()).collect();
        for source in sources {
            let base = self.ancestor.get(source).copied();
            let ours_to = ours_renamed.get(source);
            let theirs_to = theirs_renamed.get(source);
            match (ours_to, theirs_to) {
                (Some(o), Some(t)) if o == t => {
                    let side_o = self.ours.get(o).copied();
                    let side_t = self.theirs.get(t).copied();
                    handled.extend([source.clone(), o.clone()]);
                    self.merge_path(o, base, side_o, side_t)?;
                }
                (Some(o), Some(t)) => {
                    if self.theirs.contains_key(o) || self.ours.contains_key(t) {
                        continue;
                    }
                    let side_o = self.ours.get(o).copied();
                    let side_t = self.theirs.get(t).copied();
                    handled.extend([source.clone(), o.clone(), t.clone()]);
                    // A favored side keeps its name; the contents still merge.
                    let kept = match self.options.favor {
                        MergeFavor::Ours => Some((o, t)),
                        MergeFavor::Theirs => Some((t, o)),
                        MergeFavor::Normal | MergeFavor::Union => None,
                    };
                    if let Some((keep, drop)) = kept {
                        self.take(drop, None);
                        self.merge_path(keep, base, side_o, side_t)?;
                        continue;
                    }
                    let mut first = conflict(ConflictKind::RenameRename, o);
                    first.other_path = Some(t.clone());
                    let mut second = conflict(ConflictKind::RenameRename, t);
                    second.other_path = Some(o.clone());
                    self.stage_conflict(o, base, side_o, None, first);
                    self.stage_conflict(t, base, None, side_t, second);
                }
                (Some(target), None) | (None, Some(target)) => {
                    let ours_side = ours_to.is_some();
                    let (other, renamed) = if ours_side {
                        (&self.theirs, &self.ours)
                    } else {
                        (&self.ours, &self.theirs)
                    };
                    // The target name is taken on the other side; merge by path instead.
                    if other.contains_key(target) {
                        continue;
                    }
                    let moved = renamed.get(target).copied();
                    let stayed = other.get(source).copied();
                    handled.extend([source.clone(), target.clone()]);
                    match stayed {
                        Some(stayed) => {
                            let (o, t) = if ours_side {
                                (moved, Some(stayed))
                            } else {
                                (Some(stayed), moved)
                            };
                            self.merge_path(target, base, o, t)?;
                        }
                        None => {
                            let (o, t) = if ours_side { (moved, None) } else { (None, moved) };
                            self.resolve_rename_delete(target, base, o, t);
                        }
                    }
                }
                (None, None) => {}
            }
        }
        Ok(())
    }

    fn resolve_rename_delete(&mut self, path: &str, base: Side, ours: Side, theirs: Side) {
        match self.options.favor {
            MergeFavor::Ours => self.take(path, ours),
            MergeFavor::Theirs => self.take(path, theirs),
            MergeFavor::Normal | MergeFavor::Union => {
                self.stage_conflict(path, base, ours, theirs, conflict(ConflictKind::RenameDelete, path));
            }
        }
    }

    fn take(&mut self, path: &str, side: Side) {
        let resolution = match side {
            Some((mode, oid)) => Resolution::Clean(mode, oid),
            None => Resolution::Deleted,
        };
        self.result.insert(path.to_string(), resolution);
    }

    /// Merge one path given its three sides.
    fn merge_path(&mut self, path: &str, base: Side, ours: Side, theirs: Side) -> Result<()> {
        if ours == theirs {
            self.take(path, ours);
            return Ok(());
        }
        if base == ours {
            self.take(path, theirs);
            return Ok(());
        }
        if base == theirs {
            self.take(path, ours);
            return Ok(());
        }

        let favor = self.options.favor;
        let (o, t) = match (ours, theirs) {
            (Some(o), Some(t)) => (o, t),
            (Some(_), None) | (None, Some(_)) => {
                let kind = if ours.is_some() {
                    ConflictKind::ModifyDelete
                } else {
                    ConflictKind::DeleteModify
                };
                match favor {
                    MergeFavor::Ours => self.take(path, ours),
                    MergeFavor::Theirs => self.take(path, theirs),
                    MergeFavor::Normal | MergeFavor::Union => {
                        self.stage_conflict(path, base, ours, theirs, conflict(kind, path));
                    }
                }
                return Ok(());
            }
            (None, None) => {
                self.take(path, None);
                return Ok(());
            }
        };

        let same_class = o.0.class() == t.0.class()
            && base.map_or(true, |b| b.0.class() == o.0.class());
        let text = o.0.class() == ModeClass::File && t.0.class() == ModeClass::File;
        if !same_class || !text {
            let kind = match (base, same_class) {
                (None, true) => ConflictKind::AddAdd,
                (_, false) => ConflictKind::TypeChange,
                (Some(_), true) => ConflictKind::Content,
            };
            match favor {
                MergeFavor::Ours => self.take(path, ours),
                MergeFavor::Theirs => self.take(path, theirs),
                MergeFavor::Normal | MergeFavor::Union => {
                    self.stage_conflict(path, base, ours, theirs, conflict(kind, path));
                }
            }
            return Ok(());
        }

        let base_content = match base {
            Some((_, oid)) if base.is_some_and(|b| b.0.class() == ModeClass::File) => {
                Some(self.odb.read(&oid)?.data)
            }
            _ => None,
        };
        let our_content = self.odb.read(&o.1)?.data;
        let their_content = self.odb.read(&t.1)?.data;
        let result = merge_file(
            base.zip(base_content.as_deref())
                .map(|((mode, _), content)| MergeFileInput::new(content, mode)),
            MergeFileInput::new(&our_content, o.0),
            MergeFileInput::new(&their_content, t.0),
            &self.options.file_options(),
        );
        if result.automergeable {
            let oid = self.odb.write_blob(&result.content)?;
            self.result.insert(path.to_string(), Resolution::Clean(result.mode, oid));
        } else {
            let kind = if base.is_none() {
                ConflictKind::AddAdd
            } else {
                ConflictKind::Content
            };
            let mut c = conflict(kind, path);
            c.marked = Some(self.odb.write_blob(&result.content)?);
            self.stage_conflict(path, base, ours, theirs, c);
        }
        Ok(())
    }

    /// A resolved file whose path is a directory in the result becomes a conflict.
    fn directory_file_conflicts(&mut self) {
        let live: Vec<String> = self
            .result
            .iter()
            .filter(|(_, r)| !matches!(r, Resolution::Deleted))
            .map(|(p, _)| p.clone())
            .collect();
        let live_set: BTreeSet<&str> = live.iter().map(String::as_str).collect();
        let mut files = Vec::new();
        for path in &live {
            let mut prefix = path.as_str();
            while let Some((parent, _)) = prefix.rsplit_once('/') {
                if live_set.contains(parent) {
                    files.push(parent.to_string());
                }
                prefix = parent;
            }
        }
        for path in files {
            if let Some(Resolution::Clean(..)) = self.result.get(&path) {
                let ancestor = self.ancestor.get(&path).copied();
                let ours = self.ours.get(&path).copied();
                let theirs = self.theirs.get(&path).copied();
                self.stage_conflict(
                    &path,
                    ancestor,
                    ours,
                    theirs,
                    conflict(ConflictKind::DirectoryFile, &path),
                );
            }
        }
    }

    fn into_outcome(self) -> Result<MergeOutcome> {
        let mut outcome = MergeOutcome::default();
        let mut index = Index::new();
        for (path, resolution) in self.result {
            match resolution {
                Resolution::Clean(mode, oid) => index.add(path, mode, oid)?,
                Resolution::Deleted => {}
                Resolution::Conflict {
                    ancestor,
                    ours,
                    theirs,
                    conflict,
                } => {
                    index.add_conflict(path, ancestor, ours, theirs)?;
                    outcome.conflicts.push(conflict);
                }
            }
        }
        outcome.index = index;
        Ok(outcome)
    }
}

/// Merge `ours` and `theirs` relative to `ancestor` (`None`: no common
/// ancestor, every path is an addition).
pub fn merge_trees(
    odb: &Odb,
    ancestor: Option<&Oid>,
    ours: &Oid,
    theirs: &Oid,
    options: &MergeOptions,
) -> Result<MergeOutcome> {
    let mut merge = TreeMerge {
        odb,
        options,
        ancestor: files(odb, ancestor)?,
        ours: files(odb, Some(ours))?,
        theirs: files(odb, Some(theirs))?,
        result: BTreeMap::new(),
    };

    let mut handled = HashSet::new();
    if options.renames && ancestor.is_some() {
        let ours_renamed = renames(odb, ancestor, ours, options)?;
        let theirs_renamed = renames(odb, ancestor, theirs, options)?;
        merge.merge_renames(&ours_renamed, &theirs_renamed, &mut handled)?;
    }

    let paths: BTreeSet<String> = merge
        .ancestor
        .keys()
        .chain(merge.ours.keys())
        .chain(merge.theirs.keys())
        .filter(|p| !handled.contains(*p))
        .cloned()
        .collect();
    for path in paths {
        cancel::check(options.cancel.as_ref())?;
        let base = merge.ancestor.get(&path).copied();
        let o = merge.ours.get(&path).copied();
        let t = merge.theirs.get(&path).copied();
        merge.merge_path(&path, base, o, t)?;
    }
    merge.directory_file_conflicts();

    let outcome = merge.into_outcome()?;
    debug!(
        conflicts = outcome.conflicts.len(),
        entries = outcome.index.len(),
        "merged trees"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::HashAlgorithm;
    use crate::error::ErrorKind;
    use crate::index::Stage;
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

    fn kinds(outcome: &MergeOutcome) -> Vec<(ConflictKind, &str)> {
        outcome
            .conflicts
            .iter()
            .map(|c| (c.kind, c.path.as_str()))
            .collect()
    }

    const LINES: &str = "1\n2\n3\n4\n5\n6\n7\n";

    #[test]
    fn unchanged_ours_takes_theirs() {
        let odb = odb();
        let base = tree(&odb, &[("a", "x\n"), ("b", "y\n")]);
        let theirs = tree(&odb, &[("a", "changed\n"), ("c", "new\n")]);
        let outcome = merge_trees(&odb, Some(&base), &base, &theirs, &MergeOptions::default()).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.write_tree(&odb).unwrap(), theirs);
    }

    #[test]
    fn disjoint_edits_in_one_file() {
        let odb = odb();
        let base = tree(&odb, &[("f", LINES)]);
        let ours = tree(&odb, &[("f", "one\n2\n3\n4\n5\n6\n7\n")]);
        let theirs = tree(&odb, &[("f", "1\n2\n3\n4\n5\n6\nseven\n")]);
        let outcome = merge_trees(&odb, Some(&base), &ours, &theirs, &MergeOptions::default()).unwrap();
        assert!(outcome.is_clean());
        let merged = outcome.index.get("f", Stage::Normal).unwrap();
        assert_eq!(
            &*odb.read(&merged.oid).unwrap().data,
            b"one\n2\n3\n4\n5\n6\nseven\n"
        );
    }

    #[test]
    fn conflicting_edits_are_staged() {
        let odb = odb();
        let base = tree(&odb, &[("f", "a\nb\nc\n"), ("g", "same\n")]);
        let ours = tree(&odb, &[("f", "a\nX\nc\n"), ("g", "same\n")]);
        let theirs = tree(&odb, &[("f", "a\nY\nc\n"), ("g", "same\n")]);
        let outcome = merge_trees(&odb, Some(&base), &ours, &theirs, &MergeOptions::default()).unwrap();
        assert_eq!(kinds(&outcome), vec![(ConflictKind::Content, "f")]);
        assert!(outcome.index.is_conflicted("f"));
        assert!(outcome.index.get("f", Stage::Normal).is_none());
        assert!(outcome.index.get("g", Stage::Normal).is_some());
        let marked = outcome.conflicts[0].marked.unwrap();
        let text = odb.read(&marked).unwrap().data;
        assert!(text.starts_with(b"a\n<<<<<<< ours\nX\n"));
        assert_eq!(outcome.write_tree(&odb).unwrap_err().kind(), ErrorKind::Conflict);

        let favored = MergeOptions {
            favor: MergeFavor::Theirs,
            ..MergeOptions::default()
        };
        let outcome = merge_trees(&odb, Some(&base), &ours, &theirs, &favored).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.write_tree(&odb).unwrap(), theirs);
    }

    #[test]
    fn modify_delete_both_ways() {
        let odb = odb();
        let base = tree(&odb, &[("a", "1\n"), ("b", "2\n")]);
        let ours = tree(&odb, &[("a", "changed\n")]);
        let theirs = tree(&odb, &[("b", "changed\n")]);
        let outcome = merge_trees(&odb, Some(&base), &ours, &theirs, &MergeOptions::default()).unwrap();
        assert_eq!(
            kinds(&outcome),
            vec![(ConflictKind::ModifyDelete, "a"), (ConflictKind::DeleteModify, "b")]
        );
        let conflict = outcome.index.conflicts().next().unwrap();
        assert!(conflict.ancestor.is_some());
        assert!(conflict.ours.is_some());
        assert!(conflict.theirs.is_none());
    }

    #[test]
    fn add_add_and_no_ancestor() {
        let odb = odb();
        let ours = tree(&odb, &[("same", "s\n"), ("x", "ours\n")]);
        let theirs = tree(&odb, &[("same", "s\n"), ("x", "theirs\n")]);
        let outcome = merge_trees(&odb, None, &ours, &theirs, &MergeOptions::default()).unwrap();
        assert_eq!(kinds(&outcome), vec![(ConflictKind::AddAdd, "x")]);
        assert!(outcome.index.get("same", Stage::Normal).is_some());
        let conflict = outcome.index.conflicts().next().unwrap();
        assert!(conflict.ancestor.is_none());
    }

    #[test]
    fn rename_on_one_side_carries_edits_from_the_other() {
        let odb = odb();
        let base = tree(&odb, &[("old.txt", LINES)]);
        let ours = tree(&odb, &[("new.txt", LINES)]);
        let theirs = tree(&odb, &[("old.txt", "1\n2\n3\n4\n5\n6\nseven\n")]);
        let outcome = merge_trees(&odb, Some(&base), &ours, &theirs, &MergeOptions::default()).unwrap();
        assert!(outcome.is_clean());
        assert!(outcome.index.get("old.txt", Stage::Normal).is_none());
        let merged = outcome.index.get("new.txt", Stage::Normal).unwrap();
        assert_eq!(&*odb.read(&merged.oid).unwrap().data, b"1\n2\n3\n4\n5\n6\nseven\n");

        let no_renames = MergeOptions {
            renames: false,
            ..MergeOptions::default()
        };
        let outcome = merge_trees(&odb, Some(&base), &ours, &theirs, &no_renames).unwrap();
        assert_eq!(kinds(&outcome), vec![(ConflictKind::DeleteModify, "old.txt")]);
    }

    #[test]
    fn rename_rename_and_rename_delete() {
        let odb = odb();
        let base = tree(&odb, &[("a", LINES), ("b", "b1\nb2\nb3\n")]);
        let ours = tree(&odb, &[("a1", LINES), ("b2", "b1\nb2\nb3\n")]);
        let theirs = tree(&odb, &[("a2", LINES)]);
        let outcome = merge_trees(&odb, Some(&base), &ours, &theirs, &MergeOptions::default()).unwrap();
        assert_eq!(
            kinds(&outcome),
            vec![
                (ConflictKind::RenameRename, "a1"),
                (ConflictKind::RenameRename, "a2"),
                (ConflictKind::RenameDelete, "b2"),
            ]
        );
        assert_eq!(outcome.conflicts[0].other_path.as_deref(), Some("a2"));
    }

    #[test]
    fn favored_side_keeps_its_name_in_rename_rename() {
        let odb = odb();
        let base = tree(&odb, &[("a", LINES)]);
        let ours = tree(&odb, &[("a1", "one\n2\n3\n4\n5\n6\n7\n")]);
        let theirs = tree(&odb, &[("a2", "1\n2\n3\n4\n5\n6\nseven\n")]);
        for (favor, kept, dropped) in [(MergeFavor::Ours, "a1", "a2"), (MergeFavor::Theirs, "a2", "a1")] {
            let options = MergeOptions {
                favor,
                ..MergeOptions::default()
            };
            let outcome = merge_trees(&odb, Some(&base), &ours, &theirs, &options).unwrap();
            assert!(outcome.is_clean(), "{favor:?}");
            assert!(outcome.index.get(dropped, Stage::Normal).is_none());
            let merged = outcome.index.get(kept, Stage::Normal).unwrap();
            assert_eq!(
                &*odb.read(&merged.oid).unwrap().data,
                b"one\n2\n3\n4\n5\n6\nseven\n"
            );
        }
    }

    #[test]
    fn directory_file_collision() {
        let odb = odb();
        let base = tree(&odb, &[("keep", "k\n")]);
        let ours = tree(&odb, &[("keep", "k\n"), ("p", "file\n")]);
        let theirs = tree(&odb, &[("keep", "k\n"), ("p/child", "nested\n")]);
        let outcome = merge_trees(&odb, Some(&base), &ours, &theirs, &MergeOptions::default()).unwrap();
        assert_eq!(kinds(&outcome), vec![(ConflictKind::DirectoryFile, "p")]);
        assert!(outcome.index.get("p/child", Stage::Normal).is_some());
    }

    #[test]
    fn type_change_conflict() {
        let odb = odb();
        let blob = odb.write_blob(b"t").unwrap();
        let other = odb.write_blob(b"u").unwrap();
        let base = TreeUpdater::new(&odb).upsert("p", FileMode::Blob, blob).apply(None).unwrap();
        let ours = TreeUpdater::new(&odb).upsert("p", FileMode::Link, blob).apply(None).unwrap();
        let theirs = TreeUpdater::new(&odb).upsert("p", FileMode::Blob, other).apply(None).unwrap();
        let outcome = merge_trees(&odb, Some(&base), &ours, &theirs, &MergeOptions::default()).unwrap();
        assert_eq!(kinds(&outcome), vec![(ConflictKind::TypeChange, "p")]);
    }
}
