//! graph
//!
//! Queries over the commit parent graph: merge bases, ahead/behind counts
//! and ancestry checks.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::core::types::Oid;
use crate::error::{Error, Result};
use crate::odb::Odb;

/// Every commit reachable from `start`, `start` included.
pub(crate) fn ancestors(odb: &Odb, start: &Oid) -> Result<HashSet<Oid>> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([*start]);
    while let Some(oid) = queue.pop_front() {
        if !seen.insert(oid) {
            continue;
        }
        let commit = odb.find_commit(&oid)?;
        queue.extend(commit.parents.iter().filter(|p| !seen.contains(*p)));
    }
    Ok(seen)
}

/// All best common ancestors of `a` and `b`: common ancestors that are not
/// themselves ancestors of another common ancestor.
///
/// Sorted newest committer time first, ties by id.
pub fn merge_bases(odb: &Odb, a: &Oid, b: &Oid) -> Result<Vec<Oid>> {
    let ours = ancestors(odb, a)?;
    let theirs = ancestors(odb, b)?;
    let common: HashSet<Oid> = ours.intersection(&theirs).copied().collect();

    let mut redundant = HashSet::new();
    for oid in &common {
        if redundant.contains(oid) {
            continue;
        }
        for parent in odb.find_commit(oid)?.parents {
            if common.contains(&parent) && !redundant.contains(&parent) {
                redundant.extend(ancestors(odb, &parent)?);
            }
        }
    }

    let mut bases = Vec::new();
    for oid in common.difference(&redundant) {
        let time = odb.find_commit(oid)?.committer.when.seconds;
        bases.push((time, *oid));
    }
    bases.sort_by(|x, y| y.0.cmp(&x.0).then(x.1.cmp(&y.1)));
    debug!(%a, %b, bases = bases.len(), "computed merge bases");
    Ok(bases.into_iter().map(|(_, oid)| oid).collect())
}

/// The first of [`merge_bases`].
///
/// # Errors
///
/// `NotFound` when the histories are unrelated.
pub fn merge_base(odb: &Odb, a: &Oid, b: &Oid) -> Result<Oid> {
    merge_bases(odb, a, b)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found("merge base", format!("{a} {b}")))
}

/// Number of commits unique to `local` and to `upstream`.
pub fn ahead_behind(odb: &Odb, local: &Oid, upstream: &Oid) -> Result<(usize, usize)> {
    let ours = ancestors(odb, local)?;
    let theirs = ancestors(odb, upstream)?;
    Ok((
        ours.difference(&theirs).count(),
        theirs.difference(&ours).count(),
    ))
}

/// Whether `commit` strictly descends from `ancestor`. A commit is not its
/// own descendant.
pub fn descendant_of(odb: &Odb, commit: &Oid, ancestor: &Oid) -> Result<bool> {
    if commit == ancestor {
        return Ok(false);
    }
    Ok(ancestors(odb, commit)?.contains(ancestor))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::core::types::{HashAlgorithm, Oid, Signature, Time};
    use crate::object::{Commit, TreeBuilder};
    use crate::odb::Odb;

    /// Commit with an empty tree, committed at `time`.
    pub fn commit(odb: &Odb, parents: &[Oid], time: i64, message: &str) -> Oid {
        let tree = TreeBuilder::new(odb).write().unwrap();
        let sig = Signature::new("T", "t@x", Time::new(time, 0)).unwrap();
        let commit = Commit::new(tree, parents.to_vec(), sig.clone(), sig, format!("{message}\n"));
        odb.write_commit(&commit).unwrap()
    }

    /// `root <- b, root <- c, (b, c) <- tip`.
    pub fn diamond() -> (Odb, [Oid; 4]) {
        let odb = Odb::in_memory(HashAlgorithm::Sha1);
        let root = commit(&odb, &[], 1, "root");
        let b = commit(&odb, &[root], 2, "b");
        let c = commit(&odb, &[root], 3, "c");
        let tip = commit(&odb, &[b, c], 4, "tip");
        (odb, [root, b, c, tip])
    }
}
