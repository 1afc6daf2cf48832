//! Property-based tests for the object store, diff and merge engines.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use std::collections::BTreeMap;

use proptest::prelude::*;

use grove::core::types::{FileMode, HashAlgorithm, ObjectType, Oid};
use grove::diff::{self, DiffOptions};
use grove::merge::{merge_file, merge_trees, FileMergeOptions, MergeFileInput, MergeOptions};
use grove::object::{TreeBuilder, TreeUpdater};
use grove::odb::Odb;

/// Paths, some naming a file on one side and a directory on the other.
/// When a snapshot holds both, the nested path wins.
const PATHS: &[&str] = &["a.txt", "b", "b/c.txt", "b/d.txt", "e/f", "e/f/g.txt", "h"];

fn object_kind() -> impl Strategy<Value = ObjectType> {
    prop_oneof![Just(ObjectType::Blob), Just(ObjectType::Tree), Just(ObjectType::Commit)]
}

/// A snapshot: some subset of `PATHS` with small contents.
fn snapshot() -> impl Strategy<Value = BTreeMap<&'static str, String>> {
    prop::collection::btree_map(prop::sample::select(PATHS), "[a-c]{0,3}(\n[a-c]{0,3}){0,3}", 1..PATHS.len())
}

fn write_snapshot(odb: &Odb, files: &BTreeMap<&'static str, String>) -> Oid {
    let mut updater = TreeUpdater::new(odb);
    for (path, content) in files {
        let blob = odb.write_blob(content.as_bytes()).unwrap();
        updater.upsert(*path, FileMode::Blob, blob);
    }
    updater.apply(None).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Stored payloads read back unchanged, under the id `hash` predicts.
    #[test]
    fn written_objects_read_back(payload in prop::collection::vec(any::<u8>(), 0..256)) {
        for algorithm in [HashAlgorithm::Sha1, HashAlgorithm::Sha256] {
            let odb = Odb::in_memory(algorithm);
            let oid = odb.write(ObjectType::Blob, &payload).unwrap();
            prop_assert_eq!(oid, odb.hash(ObjectType::Blob, &payload));
            let raw = odb.read(&oid).unwrap();
            prop_assert_eq!(raw.kind, ObjectType::Blob);
            prop_assert_eq!(&raw.data[..], &payload[..]);
            prop_assert_eq!(odb.read_header(&oid).unwrap(), (ObjectType::Blob, payload.len()));
        }
    }

    /// The type participates in the id: equal payloads of different types differ.
    #[test]
    fn object_type_changes_id(
        payload in prop::collection::vec(any::<u8>(), 0..64),
        a in object_kind(),
        b in object_kind(),
    ) {
        let odb = Odb::in_memory(HashAlgorithm::Sha1);
        prop_assert_eq!(a == b, odb.hash(a, &payload) == odb.hash(b, &payload));
    }

    /// Tree ids do not depend on the order entries were inserted.
    #[test]
    fn tree_builder_is_order_independent(
        order in Just((0..8).collect::<Vec<usize>>()).prop_shuffle(),
    ) {
        let odb = Odb::in_memory(HashAlgorithm::Sha1);
        let blob = odb.write_blob(b"x").unwrap();
        let sub = odb.write_blob(b"y").unwrap();
        let subtree = {
            let mut builder = TreeBuilder::new(&odb);
            builder.insert("inner", FileMode::Blob, sub).unwrap();
            builder.write().unwrap()
        };
        let names = ["a", "a.b", "a-b", "b", "dir", "dir.txt", "z", "0"];

        let build = |indices: &[usize]| {
            let mut builder = TreeBuilder::new(&odb);
            for &i in indices {
                let name = names[i];
                if name == "dir" {
                    builder.insert(name, FileMode::Tree, subtree).unwrap();
                } else {
                    builder.insert(name, FileMode::Blob, blob).unwrap();
                }
            }
            builder.write().unwrap()
        };
        let sorted: Vec<usize> = (0..names.len()).collect();
        prop_assert_eq!(build(&order), build(&sorted));
    }

    /// Applying the diff between two trees to the first reproduces the second.
    #[test]
    fn diff_applied_to_old_gives_new(old in snapshot(), new in snapshot(), renames in any::<bool>()) {
        let odb = Odb::in_memory(HashAlgorithm::Sha1);
        let old_tree = write_snapshot(&odb, &old);
        let new_tree = write_snapshot(&odb, &new);
        let options = DiffOptions {
            detect_renames: renames,
            ..DiffOptions::default()
        };
        let changes = diff::tree_to_tree(&odb, Some(&old_tree), Some(&new_tree), &options).unwrap();
        prop_assert_eq!(diff::apply_to_tree(Some(&old_tree), &changes).unwrap(), new_tree);
    }

    /// A side that did not change contributes nothing to the merge.
    #[test]
    fn merge_with_unchanged_side_takes_other(base in snapshot(), changed in snapshot()) {
        let odb = Odb::in_memory(HashAlgorithm::Sha1);
        let base_tree = write_snapshot(&odb, &base);
        let changed_tree = write_snapshot(&odb, &changed);
        let options = MergeOptions::default();

        let ours = merge_trees(&odb, Some(&base_tree), &changed_tree, &base_tree, &options).unwrap();
        prop_assert!(ours.is_clean());
        prop_assert_eq!(ours.write_tree(&odb).unwrap(), changed_tree);

        let theirs = merge_trees(&odb, Some(&base_tree), &base_tree, &changed_tree, &options).unwrap();
        prop_assert!(theirs.is_clean());
        prop_assert_eq!(theirs.write_tree(&odb).unwrap(), changed_tree);

        let same = merge_trees(&odb, Some(&base_tree), &changed_tree, &changed_tree, &options).unwrap();
        prop_assert!(same.is_clean());
        prop_assert_eq!(same.write_tree(&odb).unwrap(), changed_tree);
    }

    /// Edits to lines far enough apart merge cleanly and keep both changes.
    #[test]
    fn separated_line_edits_merge_cleanly(len in 6usize..20, a in 0usize..20, gap in 3usize..10) {
        let ours_at = a % len;
        let theirs_at = ours_at + gap;
        prop_assume!(theirs_at < len);

        let lines: Vec<String> = (0..len).map(|i| format!("line {i}\n")).collect();
        let edit = |at: usize, label: &str| {
            let mut out = lines.clone();
            out[at] = format!("{label} {at}\n");
            out.concat()
        };
        let base = lines.concat();
        let ours = edit(ours_at, "ours");
        let theirs = edit(theirs_at, "theirs");

        let result = merge_file(
            Some(MergeFileInput::new(base.as_bytes(), FileMode::Blob)),
            MergeFileInput::new(ours.as_bytes(), FileMode::Blob),
            MergeFileInput::new(theirs.as_bytes(), FileMode::Blob),
            &FileMergeOptions::default(),
        );
        prop_assert!(result.automergeable);
        prop_assert_eq!(result.conflicts, 0);

        let mut expected = lines.clone();
        expected[ours_at] = format!("ours {ours_at}\n");
        expected[theirs_at] = format!("theirs {theirs_at}\n");
        prop_assert_eq!(String::from_utf8(result.content).unwrap(), expected.concat());
    }
}
