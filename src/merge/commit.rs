//! merge::commit
//!
//! Commit-level entry points built on [`merge_trees`].

use tracing::debug;

use super::{merge_trees, MergeOptions, MergeOutcome};
use crate::core::types::Oid;
use crate::error::{Error, Result};
use crate::graph;
use crate::odb::Odb;
use crate::refs::RefStore;

/// Merge two commits over their merge base.
///
/// With several merge bases the first one (most recent) serves as the
/// ancestor; unrelated histories merge against an empty ancestor.
pub fn merge_commits(odb: &Odb, ours: &Oid, theirs: &Oid, options: &MergeOptions) -> Result<MergeOutcome> {
    let ours = odb.peel_to_commit(ours)?;
    let theirs = odb.peel_to_commit(theirs)?;
    let bases = graph::merge_bases(odb, &ours, &theirs)?;
    let ancestor = match bases.first() {
        Some(base) => Some(odb.peel_to_tree(base)?),
        None => None,
    };
    debug!(%ours, %theirs, bases = bases.len(), "merging commits");
    merge_trees(
        odb,
        ancestor.as_ref(),
        &odb.peel_to_tree(&ours)?,
        &odb.peel_to_tree(&theirs)?,
        options,
    )
}

fn single_parent_tree(odb: &Odb, commit: &Oid) -> Result<Option<Oid>> {
    let parsed = odb.find_commit(commit)?;
    match parsed.parents.as_slice() {
        [] => Ok(None),
        [parent] => Ok(Some(odb.peel_to_tree(parent)?)),
        _ => Err(Error::InvalidState(format!(
            "{commit} is a merge commit"
        ))),
    }
}

/// Apply the changes introduced by `commit` on top of `onto`.
///
/// The ancestor is the commit's parent; a root commit merges against an
/// empty ancestor. Merge commits are rejected with `InvalidState`.
pub fn cherry_pick(odb: &Odb, commit: &Oid, onto: &Oid, options: &MergeOptions) -> Result<MergeOutcome> {
    let commit = odb.peel_to_commit(commit)?;
    let parent_tree = single_parent_tree(odb, &commit)?;
    merge_trees(
        odb,
        parent_tree.as_ref(),
        &odb.peel_to_tree(onto)?,
        &odb.peel_to_tree(&commit)?,
        options,
    )
}

/// Undo the changes introduced by `commit` on top of `onto`.
pub fn revert(odb: &Odb, commit: &Oid, onto: &Oid, options: &MergeOptions) -> Result<MergeOutcome> {
    let commit = odb.peel_to_commit(commit)?;
    let parent_tree = match single_parent_tree(odb, &commit)? {
        Some(tree) => tree,
        None => odb.write_tree(&crate::object::Tree::empty())?,
    };
    let commit_tree = odb.peel_to_tree(&commit)?;
    merge_trees(
        odb,
        Some(&commit_tree),
        &odb.peel_to_tree(onto)?,
        &parent_tree,
        options,
    )
}

/// How HEAD relates to a commit that is about to be merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeAnalysis {
    /// Their commit is already reachable from HEAD.
    pub up_to_date: bool,
    /// HEAD is an ancestor of their commit.
    pub fast_forward: bool,
    /// A real merge is possible.
    pub normal: bool,
    /// HEAD is unborn; their commit can simply be checked out.
    pub unborn: bool,
}

pub fn merge_analysis(odb: &Odb, refs: &RefStore, theirs: &Oid) -> Result<MergeAnalysis> {
    let theirs = odb.peel_to_commit(theirs)?;
    let head = match refs.head() {
        Ok(head) => head.oid,
        Err(Error::Unborn(_)) => {
            return Ok(MergeAnalysis {
                fast_forward: true,
                unborn: true,
                ..MergeAnalysis::default()
            })
        }
        Err(e) => return Err(e),
    };
    let head = odb.peel_to_commit(&head)?;
    if head == theirs || graph::descendant_of(odb, &head, &theirs)? {
        return Ok(MergeAnalysis {
            up_to_date: true,
            ..MergeAnalysis::default()
        });
    }
    Ok(MergeAnalysis {
        fast_forward: graph::descendant_of(odb, &theirs, &head)?,
        normal: true,
        ..MergeAnalysis::default()
    })
}
