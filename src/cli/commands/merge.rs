//! merge-tree command - Merge two commits into a tree

use anyhow::{Context as _, Result};
use std::process::ExitCode;

use super::{resolve_commit, Context};
use crate::core::types::Oid;
use crate::merge::{ConflictKind, MergeOutcome};
use crate::odb::Odb;
use crate::repo::Repository;
use crate::ui::output;

fn label(kind: ConflictKind) -> &'static str {
    match kind {
        ConflictKind::Content => "content",
        ConflictKind::ModifyDelete => "modify/delete",
        ConflictKind::DeleteModify => "delete/modify",
        ConflictKind::AddAdd => "add/add",
        ConflictKind::RenameRename => "rename/rename",
        ConflictKind::RenameDelete => "rename/delete",
        ConflictKind::TypeChange => "file type",
        ConflictKind::DirectoryFile => "directory/file",
    }
}

/// Tree of a conflicted merge: marked-up content for content conflicts,
/// our side (or theirs, when we have none) everywhere else.
fn conflicted_tree(odb: &Odb, outcome: &MergeOutcome) -> Result<Oid> {
    let mut index = outcome.index.clone();
    let staged: Vec<_> = outcome.index.conflicts().collect();
    for conflict in staged {
        let marked = outcome
            .conflicts
            .iter()
            .find(|c| c.path == conflict.path)
            .and_then(|c| c.marked);
        let side = conflict.ours.as_ref().or(conflict.theirs.as_ref());
        match (marked, side) {
            (Some(blob), Some(entry)) => index.resolve(&conflict.path, entry.mode, blob)?,
            (None, Some(entry)) => index.resolve(&conflict.path, entry.mode, entry.oid)?,
            (_, None) => index.resolve_removed(&conflict.path)?,
        }
    }
    Ok(index.write_tree(odb)?)
}

fn merge(repo: &Repository, base: Option<&str>, ours: &Oid, theirs: &Oid) -> Result<MergeOutcome> {
    let options = repo.merge_options();
    let outcome = match base {
        Some(base) => {
            let odb = repo.odb();
            let ancestor = odb.peel_to_tree(&resolve_commit(repo, base)?)?;
            repo.merge_trees(
                Some(&ancestor),
                &odb.peel_to_tree(ours)?,
                &odb.peel_to_tree(theirs)?,
                &options,
            )?
        }
        None => repo.merge_commits(ours, theirs, &options)?,
    };
    Ok(outcome)
}

/// Print the merged tree, then one `CONFLICT` line per unresolved path.
/// Exit status 1 means the merge was not clean.
pub fn merge_tree(ctx: &Context, base: Option<&str>, ours: &str, theirs: &str) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let ours = resolve_commit(&repo, ours)?;
    let theirs = resolve_commit(&repo, theirs)?;
    let outcome = merge(&repo, base, &ours, &theirs)?;

    if outcome.is_clean() {
        output::result(outcome.write_tree(repo.odb())?);
        return Ok(ExitCode::SUCCESS);
    }
    let tree = conflicted_tree(repo.odb(), &outcome).context("cannot write conflicted tree")?;
    output::result(tree);
    output::result("");
    for conflict in &outcome.conflicts {
        match &conflict.other_path {
            Some(other) => output::result(format!(
                "CONFLICT ({}): {} and {}",
                label(conflict.kind),
                conflict.path,
                other
            )),
            None => output::result(format!("CONFLICT ({}): {}", label(conflict.kind), conflict.path)),
        }
    }
    Ok(ExitCode::from(1))
}
