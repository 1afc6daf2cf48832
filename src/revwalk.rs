//! revwalk
//!
//! Revision walker over the commit graph.
//!
//! # State machine
//!
//! ```text
//! Idle --push/hide--> Primed --next--> Walking --(no more)--> Exhausted
//!   ^                                                            |
//!   +------------------------------ reset -----------------------+
//! ```
//!
//! - `next()` with nothing pushed fails with `NotPrimed`.
//! - Once exhausted, `next()` keeps returning `Ok(None)`.
//! - Hidden commits and their whole ancestry are computed before the
//!   first commit is emitted and are never emitted.
//! - Each commit is emitted at most once, however many paths reach it.
//!
//! # Ordering
//!
//! - [`Sort::NONE`]: depth-first from the starting points, first parent first.
//! - [`Sort::TIME`]: newest committer time first; ties keep discovery order.
//! - [`Sort::TOPOLOGICAL`]: no commit is emitted before all of its
//!   children in the walk; combined with `TIME` the newest ready commit
//!   goes first.
//! - [`Sort::REVERSE`]: emit the final order backwards.
//!
//! `NONE` and `TIME` stream; topological and reversed walks materialize
//! the reachable set on the first call to `next()`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::ops::BitOr;

use tracing::debug;

use crate::core::cancel::{self, CancelToken};
use crate::core::types::{Oid, RefName};
use crate::error::{Error, Result};
use crate::odb::Odb;
use crate::refs::RefStore;
use crate::revparse;

/// Ordering flags. Combine with `|`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sort {
    pub topological: bool,
    pub time: bool,
    pub reverse: bool,
}

impl Sort {
    pub const NONE: Sort = Sort {
        topological: false,
        time: false,
        reverse: false,
    };
    pub const TOPOLOGICAL: Sort = Sort {
        topological: true,
        ..Sort::NONE
    };
    pub const TIME: Sort = Sort {
        time: true,
        ..Sort::NONE
    };
    pub const REVERSE: Sort = Sort {
        reverse: true,
        ..Sort::NONE
    };

    fn streams(self) -> bool {
        !self.topological && !self.reverse
    }
}

impl BitOr for Sort {
    type Output = Sort;

    fn bitor(self, rhs: Sort) -> Sort {
        Sort {
            topological: self.topological || rhs.topological,
            time: self.time || rhs.time,
            reverse: self.reverse || rhs.reverse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    Idle,
    Primed,
    Walking,
    Exhausted,
}

#[derive(Debug, Clone)]
struct CommitNode {
    parents: Vec<Oid>,
    time: i64,
}

/// Heap key: newest first, then lowest discovery sequence.
#[derive(Debug, PartialEq, Eq)]
struct Pending {
    time: i64,
    seq: u64,
    oid: Oid,
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
enum Frontier {
    Stack(Vec<Oid>),
    Heap(BinaryHeap<Pending>),
    Materialized(VecDeque<Oid>),
}

/// Walks commits reachable from pushed starting points, minus hidden ones.
///
/// Single owner: the walker holds mutable traversal state.
#[derive(Debug)]
pub struct RevWalk<'r> {
    odb: &'r Odb,
    refs: &'r RefStore,
    state: WalkState,
    pushed: Vec<Oid>,
    hidden: Vec<Oid>,
    sorting: Sort,
    first_parent: bool,
    cancel: Option<CancelToken>,

    nodes: HashMap<Oid, CommitNode>,
    excluded: HashSet<Oid>,
    seen: HashSet<Oid>,
    frontier: Frontier,
    seq: u64,
}

impl<'r> RevWalk<'r> {
    pub fn new(odb: &'r Odb, refs: &'r RefStore) -> Self {
        Self {
            odb,
            refs,
            state: WalkState::Idle,
            pushed: Vec::new(),
            hidden: Vec::new(),
            sorting: Sort::NONE,
            first_parent: false,
            cancel: None,
            nodes: HashMap::new(),
            excluded: HashSet::new(),
            seen: HashSet::new(),
            frontier: Frontier::Stack(Vec::new()),
            seq: 0,
        }
    }

    pub fn state(&self) -> WalkState {
        self.state
    }

    /// Checked before each emitted commit.
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    /// Change the ordering. A walk already in progress is reset.
    pub fn set_sorting(&mut self, sort: Sort) {
        if matches!(self.state, WalkState::Walking | WalkState::Exhausted) {
            self.reset();
        }
        self.sorting = sort;
    }

    /// Follow only the first parent of each commit.
    pub fn simplify_first_parent(&mut self) {
        self.first_parent = true;
    }

    fn ensure_accepting(&self) -> Result<()> {
        match self.state {
            WalkState::Idle | WalkState::Primed => Ok(()),
            state => Err(Error::InvalidState(format!(
                "cannot add starting points while {state:?}"
            ))),
        }
    }

    fn to_commit(&self, oid: &Oid) -> Result<Oid> {
        self.odb.peel_to_commit(oid)
    }

    /// Add a starting point. Tags are peeled.
    ///
    /// # Errors
    ///
    /// `InvalidTarget` if `oid` does not lead to a commit.
    pub fn push(&mut self, oid: &Oid) -> Result<()> {
        self.ensure_accepting()?;
        let commit = self.to_commit(oid)?;
        self.pushed.push(commit);
        self.state = WalkState::Primed;
        Ok(())
    }

    /// Exclude a commit and all of its ancestors.
    pub fn hide(&mut self, oid: &Oid) -> Result<()> {
        self.ensure_accepting()?;
        let commit = self.to_commit(oid)?;
        self.hidden.push(commit);
        self.state = WalkState::Primed;
        Ok(())
    }

    pub fn push_ref(&mut self, name: &RefName) -> Result<()> {
        let oid = self.refs.resolve(name)?;
        self.push(&oid)
    }

    pub fn hide_ref(&mut self, name: &RefName) -> Result<()> {
        let oid = self.refs.resolve(name)?;
        self.hide(&oid)
    }

    pub fn push_head(&mut self) -> Result<()> {
        let head = self.refs.head()?;
        self.push(&head.oid)
    }

    /// Push `b` and hide `a` for a range `a..b`. An empty side means HEAD.
    pub fn push_range(&mut self, range: &str) -> Result<()> {
        let (from, to) = revparse::range(self.odb, self.refs, range)?;
        self.hide(&from)?;
        self.push(&to)
    }

    /// Forget starting points and progress, keeping sort and simplification.
    pub fn reset(&mut self) {
        self.state = WalkState::Idle;
        self.pushed.clear();
        self.hidden.clear();
        self.nodes.clear();
        self.excluded.clear();
        self.seen.clear();
        self.frontier = Frontier::Stack(Vec::new());
        self.seq = 0;
    }

    fn node(&mut self, oid: &Oid) -> Result<&CommitNode> {
        if !self.nodes.contains_key(oid) {
            let commit = self.odb.find_commit(oid)?;
            let mut parents = commit.parents;
            if self.first_parent {
                parents.truncate(1);
            }
            self.nodes.insert(
                *oid,
                CommitNode {
                    parents,
                    time: commit.committer.when.seconds,
                },
            );
        }
        self.nodes
            .get(oid)
            .ok_or_else(|| Error::not_found("commit", oid))
    }

    fn mark_hidden(&mut self) -> Result<()> {
        let mut queue: VecDeque<Oid> = self.hidden.iter().copied().collect();
        while let Some(oid) = queue.pop_front() {
            if !self.excluded.insert(oid) {
                continue;
            }
            let commit = self.odb.find_commit(&oid)?;
            queue.extend(commit.parents.into_iter().filter(|p| !self.excluded.contains(p)));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.mark_hidden()?;
        let starts: Vec<Oid> = self
            .pushed
            .iter()
            .filter(|oid| !self.excluded.contains(*oid))
            .copied()
            .collect();

        self.frontier = if self.sorting.streams() && self.sorting.time {
            let mut heap = BinaryHeap::new();
            for oid in starts {
                let time = self.node(&oid)?.time;
                heap.push(Pending {
                    time,
                    seq: self.next_seq(),
                    oid,
                });
            }
            Frontier::Heap(heap)
        } else if self.sorting.streams() {
            Frontier::Stack(starts.into_iter().rev().collect())
        } else {
            Frontier::Materialized(self.materialize(starts)?)
        };
        self.state = WalkState::Walking;
        debug!(
            pushed = self.pushed.len(),
            hidden = self.excluded.len(),
            sort = ?self.sorting,
            "revision walk started"
        );
        Ok(())
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Full ordering for topological and reversed walks.
    fn materialize(&mut self, starts: Vec<Oid>) -> Result<VecDeque<Oid>> {
        // Reachable set in discovery order.
        let mut order = Vec::new();
        let mut reached = HashSet::new();
        let mut stack: Vec<Oid> = starts.iter().rev().copied().collect();
        while let Some(oid) = stack.pop() {
            if self.excluded.contains(&oid) || !reached.insert(oid) {
                continue;
            }
            order.push(oid);
            let parents = self.node(&oid)?.parents.clone();
            stack.extend(parents.into_iter().rev());
        }

        let mut out: Vec<Oid> = if self.sorting.topological {
            self.topo_order(&starts, &order, &reached)?
        } else if self.sorting.time {
            let mut keyed = Vec::with_capacity(order.len());
            for (seq, oid) in order.iter().enumerate() {
                keyed.push((self.node(oid)?.time, seq, *oid));
            }
            keyed.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
            keyed.into_iter().map(|(_, _, oid)| oid).collect()
        } else {
            order
        };
        if self.sorting.reverse {
            out.reverse();
        }
        Ok(out.into())
    }

    fn topo_order(
        &mut self,
        starts: &[Oid],
        order: &[Oid],
        reached: &HashSet<Oid>,
    ) -> Result<Vec<Oid>> {
        let mut children: HashMap<Oid, usize> = HashMap::new();
        for oid in order {
            for parent in self.node(oid)?.parents.clone() {
                if reached.contains(&parent) {
                    *children.entry(parent).or_default() += 1;
                }
            }
        }

        let mut out = Vec::with_capacity(order.len());
        let seeds: Vec<Oid> = starts
            .iter()
            .filter(|oid| children.get(*oid).copied().unwrap_or(0) == 0)
            .copied()
            .collect();
        let mut queued: HashSet<Oid> = HashSet::new();
        let mut ready_heap = BinaryHeap::new();
        for oid in &seeds {
            if queued.insert(*oid) {
                let time = self.node(oid)?.time;
                let seq = self.next_seq();
                ready_heap.push(Pending { time, seq, oid: *oid });
            }
        }
        let mut ready_stack: Vec<Oid> = Vec::new();
        for oid in seeds.iter().rev() {
            if !ready_stack.contains(oid) {
                ready_stack.push(*oid);
            }
        }

        loop {
            let next = if self.sorting.time {
                ready_heap.pop().map(|p| p.oid)
            } else {
                ready_stack.pop()
            };
            let Some(oid) = next else { break };
            out.push(oid);
            let parents = self.node(&oid)?.parents.clone();
            for parent in parents.into_iter().rev() {
                let Some(count) = children.get_mut(&parent) else {
                    continue;
                };
                *count -= 1;
                if *count == 0 && queued.insert(parent) {
                    let time = self.node(&parent)?.time;
                    let seq = self.next_seq();
                    ready_heap.push(Pending {
                        time,
                        seq,
                        oid: parent,
                    });
                    ready_stack.push(parent);
                }
            }
        }
        Ok(out)
    }

    fn advance(&mut self) -> Result<Option<Oid>> {
        loop {
            let next = match &mut self.frontier {
                Frontier::Stack(stack) => stack.pop(),
                Frontier::Heap(heap) => heap.pop().map(|p| p.oid),
                Frontier::Materialized(queue) => return Ok(queue.pop_front()),
            };
            let Some(oid) = next else { return Ok(None) };
            if self.excluded.contains(&oid) || !self.seen.insert(oid) {
                continue;
            }

            let parents: Vec<Oid> = self
                .node(&oid)?
                .parents
                .clone()
                .into_iter()
                .filter(|p| !self.excluded.contains(p) && !self.seen.contains(p))
                .collect();
            if matches!(self.frontier, Frontier::Heap(_)) {
                let mut pending = Vec::with_capacity(parents.len());
                for parent in parents {
                    let time = self.node(&parent)?.time;
                    pending.push(Pending {
                        time,
                        seq: self.next_seq(),
                        oid: parent,
                    });
                }
                if let Frontier::Heap(heap) = &mut self.frontier {
                    heap.extend(pending);
                }
            } else if let Frontier::Stack(stack) = &mut self.frontier {
                stack.extend(parents.into_iter().rev());
            }
            return Ok(Some(oid));
        }
    }

    /// Next commit id, or `Ok(None)` once the walk is exhausted.
    ///
    /// # Errors
    ///
    /// - `NotPrimed` if nothing was pushed
    /// - `Interrupted` if the cancel token was raised
    pub fn next_commit(&mut self) -> Result<Option<Oid>> {
        match self.state {
            WalkState::Exhausted => return Ok(None),
            WalkState::Idle => return Err(Error::NotPrimed),
            WalkState::Primed if self.pushed.is_empty() => return Err(Error::NotPrimed),
            WalkState::Primed => self.start()?,
            WalkState::Walking => {}
        }
        cancel::check(self.cancel.as_ref())?;
        let next = self.advance()?;
        if next.is_none() {
            self.state = WalkState::Exhausted;
            debug!(emitted = self.seen.len(), "revision walk exhausted");
        }
        Ok(next)
    }

    /// Up to `n` further commits.
    pub fn take_commits(&mut self, n: usize) -> Result<Vec<Oid>> {
        let mut out = Vec::with_capacity(n.min(256));
        while out.len() < n {
            match self.next_commit()? {
                Some(oid) => out.push(oid),
                None => break,
            }
        }
        Ok(out)
    }
}

impl Iterator for RevWalk<'_> {
    type Item = Result<Oid>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_commit() {
            Ok(next) => next.map(Ok),
            Err(e) => {
                // Errors end the iteration.
                self.state = WalkState::Exhausted;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::HashAlgorithm;
    use crate::error::ErrorKind;
    use crate::graph::fixtures::{commit, diamond};

    fn collect(walk: &mut RevWalk<'_>) -> Vec<Oid> {
        walk.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn next_before_push_is_not_primed() {
        let (odb, _) = diamond();
        let refs = RefStore::in_memory(HashAlgorithm::Sha1);
        let mut walk = RevWalk::new(&odb, &refs);
        assert_eq!(walk.next_commit().unwrap_err().kind(), ErrorKind::NotPrimed);
    }

    #[test]
    fn pushing_a_tree_is_invalid_target() {
        let (odb, [root, ..]) = diamond();
        let refs = RefStore::in_memory(HashAlgorithm::Sha1);
        let tree = odb.find_commit(&root).unwrap().tree;
        let mut walk = RevWalk::new(&odb, &refs);
        assert_eq!(walk.push(&tree).unwrap_err().kind(), ErrorKind::InvalidTarget);
    }

    #[test]
    fn topological_emits_root_last_and_each_commit_once() {
        let (odb, [root, b, c, tip]) = diamond();
        let refs = RefStore::in_memory(HashAlgorithm::Sha1);
        for sort in [Sort::TOPOLOGICAL, Sort::TOPOLOGICAL | Sort::TIME] {
            let mut walk = RevWalk::new(&odb, &refs);
            walk.set_sorting(sort);
            walk.push(&tip).unwrap();
            walk.push(&b).unwrap();
            let order = collect(&mut walk);
            assert_eq!(order.len(), 4);
            assert_eq!(order[0], tip);
            assert_eq!(order[3], root);
            assert!(order.contains(&b) && order.contains(&c));
        }
    }

    #[test]
    fn reverse_topological_emits_parents_first() {
        let (odb, [root, _, _, tip]) = diamond();
        let refs = RefStore::in_memory(HashAlgorithm::Sha1);
        let mut walk = RevWalk::new(&odb, &refs);
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE);
        walk.push(&tip).unwrap();
        let order = collect(&mut walk);
        assert_eq!(order.first(), Some(&root));
        assert_eq!(order.last(), Some(&tip));
    }

    #[test]
    fn time_order_is_newest_first() {
        let (odb, [root, b, c, tip]) = diamond();
        let refs = RefStore::in_memory(HashAlgorithm::Sha1);
        let mut walk = RevWalk::new(&odb, &refs);
        walk.set_sorting(Sort::TIME);
        walk.push(&tip).unwrap();
        assert_eq!(collect(&mut walk), vec![tip, c, b, root]);
    }

    #[test]
    fn hidden_ancestry_is_pruned() {
        let (odb, [_, b, c, tip]) = diamond();
        let refs = RefStore::in_memory(HashAlgorithm::Sha1);
        let mut walk = RevWalk::new(&odb, &refs);
        walk.push(&tip).unwrap();
        walk.hide(&b).unwrap();
        assert_eq!(collect(&mut walk), vec![tip, c]);
    }

    #[test]
    fn first_parent_and_exhaustion() {
        let (odb, [root, b, _, tip]) = diamond();
        let refs = RefStore::in_memory(HashAlgorithm::Sha1);
        let mut walk = RevWalk::new(&odb, &refs);
        walk.simplify_first_parent();
        walk.push(&tip).unwrap();
        assert_eq!(walk.take_commits(10).unwrap(), vec![tip, b, root]);
        assert_eq!(walk.state(), WalkState::Exhausted);
        assert_eq!(walk.next_commit().unwrap(), None);
        assert_eq!(walk.next_commit().unwrap(), None);
        assert!(walk.push(&tip).is_err());

        walk.reset();
        assert_eq!(walk.state(), WalkState::Idle);
        walk.push(&b).unwrap();
        assert_eq!(walk.take_commits(1).unwrap(), vec![b]);
    }

    #[test]
    fn ranges_and_refs() {
        let (odb, [root, b, c, tip]) = diamond();
        let refs = RefStore::in_memory(HashAlgorithm::Sha1);
        let main = RefName::new("refs/heads/main").unwrap();
        let side = RefName::new("refs/heads/side").unwrap();
        refs.create(&main, tip, false, "").unwrap();
        refs.create(&side, c, false, "").unwrap();

        let mut walk = RevWalk::new(&odb, &refs);
        walk.push_range("side..main").unwrap();
        let mut got = collect(&mut walk);
        got.sort();
        let mut want = vec![tip, b];
        want.sort();
        assert_eq!(got, want);

        let mut walk = RevWalk::new(&odb, &refs);
        walk.push_ref(&main).unwrap();
        walk.hide_ref(&side).unwrap();
        assert!(!collect(&mut walk).contains(&root));
    }

    #[test]
    fn cancelled_walk_is_interrupted() {
        let odb = Odb::in_memory(HashAlgorithm::Sha1);
        let refs = RefStore::in_memory(HashAlgorithm::Sha1);
        let a = commit(&odb, &[], 1, "a");
        let token = CancelToken::new();
        let mut walk = RevWalk::new(&odb, &refs);
        walk.set_cancel_token(token.clone());
        walk.push(&a).unwrap();
        token.cancel();
        assert_eq!(walk.next_commit().unwrap_err().kind(), ErrorKind::Interrupted);
    }
}
