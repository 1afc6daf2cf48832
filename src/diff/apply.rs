//! diff::apply
//!
//! Replay a structural diff onto a tree.

use tracing::debug;

use super::{DeltaStatus, Diff};
use crate::core::types::{ObjectType, Oid};
use crate::error::Result;
use crate::object::TreeUpdater;

/// Apply every delta of `diff` to `base` and write the resulting tree.
///
/// Applying `tree_to_tree(a, b)` to `a` yields `b`. Working-tree content
/// referenced by the diff is written to the object store first.
pub fn apply_to_tree(base: Option<&Oid>, diff: &Diff<'_>) -> Result<Oid> {
    let odb = diff.odb();
    for (oid, content) in diff.pending_blobs() {
        if !odb.exists(oid)? {
            odb.write(ObjectType::Blob, content)?;
        }
    }

    let mut updater = TreeUpdater::new(odb);
    let mut applied = 0usize;
    for delta in diff.deltas() {
        let old = &delta.old_file;
        let new = &delta.new_file;
        match delta.status {
            DeltaStatus::Unmodified | DeltaStatus::Ignored | DeltaStatus::Unreadable => continue,
            DeltaStatus::Deleted => {
                updater.remove(old.path.clone());
            }
            DeltaStatus::Renamed => {
                updater.remove(old.path.clone());
                if let Some(mode) = new.mode {
                    updater.upsert(new.path.clone(), mode, new.oid);
                }
            }
            DeltaStatus::Added
            | DeltaStatus::Modified
            | DeltaStatus::TypeChanged
            | DeltaStatus::Copied
            | DeltaStatus::Untracked
            | DeltaStatus::Conflicted => match new.mode {
                Some(mode) => {
                    updater.upsert(new.path.clone(), mode, new.oid);
                }
                None => {
                    updater.remove(old.path.clone());
                }
            },
        }
        applied += 1;
    }
    let tree = updater.apply(base)?;
    debug!(applied, tree = %tree, "applied diff");
    Ok(tree)
}
