//! rebase
//!
//! Replays a linear run of commits onto a new base, one cherry-pick at a
//! time, as a persisted state machine.
//!
//! # States
//!
//! ```text
//! Idle --next--> Running --next--> ... --finish--> Completed
//!                   |  ^
//!          conflict |  | commit / resume / skip
//!                   v  |
//!             PausedOnConflict
//! any unfinished state --abort--> Aborted
//! ```
//!
//! # Persistence
//!
//! The state is written after every step (`rebase/state.json` on disk,
//! or held by an in-memory repository), so [`Rebase::open`] resumes a
//! rebase interrupted by a crash or left paused on a conflict. On disk,
//! every step is also journaled under `ops/` and an op-state marker names
//! the rebase as the operation in progress.
//!
//! While a rebase runs, HEAD is detached at the newest replayed commit
//! and the index mirrors its tree. The rebased branch is only moved by
//! [`Rebase::finish`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::ops::journal::{Journal, JournalError, OpId, OpPhase, OpState, StepKind};
use crate::core::paths::RepoPaths;
use crate::core::types::{Oid, RefName, Signature};
use crate::error::{Error, Result};
use crate::index::Index;
use crate::merge::{self, MergeOptions};
use crate::object::Commit;
use crate::repo::Repository;
use crate::revwalk::Sort;

const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebaseStatus {
    /// Initialized, nothing applied yet.
    Idle,
    Running,
    PausedOnConflict,
    Completed,
    Aborted,
}

/// One commit to replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseOperation {
    pub original: Oid,
    pub summary: String,
    /// Replayed commit, once applied.
    pub rewritten: Option<Oid>,
    /// Dropped because it became empty or the caller skipped it.
    pub skipped: bool,
}

/// Outcome of advancing a rebase by one operation.
#[derive(Debug, Clone)]
pub enum RebaseStep {
    /// The operation replayed cleanly into a new commit.
    Applied(RebaseOperation, Oid),
    /// Its changes are already present on the new base.
    Skipped(RebaseOperation),
    /// Replay stopped; resolve `index`, write it, then commit or resume.
    Conflicted(RebaseOperation, Index),
}

#[derive(Debug, Clone, Default)]
pub struct RebaseOptions {
    pub merge: MergeOptions,
    /// Committer of replayed commits; the configured identity when unset.
    pub committer: Option<Signature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RebaseState {
    version: u32,
    status: RebaseStatus,
    /// Branch being rebased; `None` for a detached HEAD.
    branch: Option<RefName>,
    orig_head: Oid,
    upstream: Oid,
    onto: Oid,
    /// Newest commit of the rewritten history.
    tip: Oid,
    operations: Vec<RebaseOperation>,
    /// Index of the next operation to apply.
    next: usize,
    /// Operation paused on a conflict.
    current: Option<usize>,
    committer: Option<Signature>,
    op_id: Option<OpId>,
}

/// A rebase in progress.
#[derive(Debug)]
pub struct Rebase<'r> {
    repo: &'r Repository,
    state: RebaseState,
    options: MergeOptions,
    journal: Option<Journal>,
}

impl<'r> Rebase<'r> {
    /// Plan a rebase of `branch` (HEAD when `None`) onto `onto` (or
    /// `upstream`), replaying the commits reachable from the branch but
    /// not from `upstream`, oldest first. Merge commits are left out.
    ///
    /// HEAD is detached at `onto`.
    ///
    /// # Errors
    ///
    /// `InvalidState` when another rebase is in progress.
    pub fn init(
        repo: &'r Repository,
        branch: Option<&RefName>,
        upstream: &Oid,
        onto: Option<&Oid>,
        options: RebaseOptions,
    ) -> Result<Self> {
        if repo.load_rebase_state()?.is_some() {
            return Err(Error::InvalidState("a rebase is already in progress".to_string()));
        }
        if let Some(paths) = repo.paths() {
            if let Some(op) = OpState::read(paths)? {
                return Err(Error::InvalidState(format!(
                    "operation '{}' ({}) is in progress",
                    op.command, op.op_id
                )));
            }
        }

        let odb = repo.odb();
        let (branch, orig_head) = match branch {
            Some(name) => {
                let (last, oid) = repo.refs().resolve_chain(name)?;
                let oid = oid.ok_or_else(|| Error::not_found("reference", name))?;
                (Some(last).filter(|n| n.as_str() != "HEAD"), oid)
            }
            None => {
                let head = repo.head()?;
                (head.branch, head.oid)
            }
        };
        let orig_head = odb.peel_to_commit(&orig_head)?;
        let upstream = odb.peel_to_commit(upstream)?;
        let onto = match onto {
            Some(onto) => odb.peel_to_commit(onto)?,
            None => upstream,
        };

        let mut walk = repo.revwalk();
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE);
        walk.push(&orig_head)?;
        walk.hide(&upstream)?;
        let mut operations = Vec::new();
        for oid in walk {
            let oid = oid?;
            let commit = odb.find_commit(&oid)?;
            if commit.is_merge() {
                continue;
            }
            operations.push(RebaseOperation {
                original: oid,
                summary: commit.summary().to_string(),
                rewritten: None,
                skipped: false,
            });
        }

        let journal = match repo.paths() {
            Some(paths) => {
                let mut journal = Journal::new("rebase");
                OpState::from_journal(&journal).write(paths)?;
                journal.append_checkpoint(paths, "start")?;
                Some(journal)
            }
            None => None,
        };

        let mut rebase = Rebase {
            repo,
            state: RebaseState {
                version: STATE_VERSION,
                status: RebaseStatus::Idle,
                branch,
                orig_head,
                upstream,
                onto,
                tip: onto,
                operations,
                next: 0,
                current: None,
                committer: options.committer,
                op_id: journal.as_ref().map(|j| j.op_id.clone()),
            },
            options: options.merge,
            journal,
        };
        rebase.move_head(onto, "rebase: checkout onto")?;
        rebase.save()?;
        debug!(
            operations = rebase.state.operations.len(),
            %onto,
            "rebase initialized"
        );
        Ok(rebase)
    }

    /// Resume the rebase persisted in `repo`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no rebase is in progress.
    pub fn open(repo: &'r Repository, options: MergeOptions) -> Result<Self> {
        let content = repo
            .load_rebase_state()?
            .ok_or_else(|| Error::not_found("rebase", "in progress"))?;
        let state: RebaseState = serde_json::from_slice(&content)
            .map_err(|e| Error::corrupt("rebase state", e.to_string()))?;
        if state.version != STATE_VERSION {
            return Err(Error::corrupt(
                "rebase state",
                format!("unsupported version {}", state.version),
            ));
        }
        let journal = match (repo.paths(), &state.op_id) {
            (Some(paths), Some(op_id)) => match Journal::read(paths, op_id) {
                Ok(journal) => Some(journal),
                Err(e) => {
                    warn!(error = %e, "rebase journal unreadable, continuing without it");
                    None
                }
            },
            _ => None,
        };
        Ok(Rebase {
            repo,
            state,
            options,
            journal,
        })
    }

    pub fn status(&self) -> RebaseStatus {
        self.state.status
    }

    pub fn operations(&self) -> &[RebaseOperation] {
        &self.state.operations
    }

    /// Operation paused on a conflict, if any.
    pub fn current(&self) -> Option<&RebaseOperation> {
        self.state.current.and_then(|i| self.state.operations.get(i))
    }

    pub fn onto(&self) -> Oid {
        self.state.onto
    }

    pub fn orig_head(&self) -> Oid {
        self.state.orig_head
    }

    pub fn branch(&self) -> Option<&RefName> {
        self.state.branch.as_ref()
    }

    /// Newest commit of the rewritten history.
    pub fn tip(&self) -> Oid {
        self.state.tip
    }

    fn require(&self, allowed: &[RebaseStatus], action: &str) -> Result<()> {
        if allowed.contains(&self.state.status) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "cannot {action} a rebase that is {:?}",
                self.state.status
            )))
        }
    }

    fn committer(&self) -> Result<Signature> {
        match &self.state.committer {
            Some(sig) => Ok(Signature::now(sig.name.clone(), sig.email.clone())?),
            None => self.repo.signature(),
        }
    }

    fn save(&self) -> Result<()> {
        let content = serde_json::to_vec_pretty(&self.state)
            .map_err(|e| Error::corrupt("rebase state", e.to_string()))?;
        self.repo.store_rebase_state(Some(&content))
    }

    fn move_head(&self, oid: Oid, message: &str) -> Result<()> {
        self.repo.refs().detach_head(oid, message)?;
        let tree = self.repo.odb().peel_to_tree(&oid)?;
        self.repo.write_index(&Index::from_tree(self.repo.odb(), &tree)?)
    }

    fn journal_step(
        &mut self,
        step: impl FnOnce(&mut Journal, &RepoPaths) -> std::result::Result<(), JournalError>,
    ) -> Result<()> {
        if let (Some(journal), Some(paths)) = (self.journal.as_mut(), self.repo.paths()) {
            step(journal, paths)?;
        }
        Ok(())
    }

    fn set_phase(&self, phase: OpPhase) -> Result<()> {
        if let (Some(journal), Some(paths)) = (&self.journal, self.repo.paths()) {
            let mut marker = OpState::from_journal(journal);
            marker.update_phase(phase, paths)?;
        }
        Ok(())
    }

    /// Apply the next operation. `Ok(None)` once every operation is done.
    ///
    /// # Errors
    ///
    /// `InvalidState` while paused on a conflict or after the rebase
    /// completed or was aborted.
    pub fn next(&mut self) -> Result<Option<RebaseStep>> {
        self.require(&[RebaseStatus::Idle, RebaseStatus::Running], "advance")?;
        let Some(op) = self.state.operations.get(self.state.next).cloned() else {
            return Ok(None);
        };
        let index = self.state.next;
        self.state.status = RebaseStatus::Running;
        let odb = self.repo.odb();

        let outcome = merge::cherry_pick(odb, &op.original, &self.state.tip, &self.options)?;
        if !outcome.is_clean() {
            let paths: Vec<String> = outcome.conflicts.iter().map(|c| c.path.clone()).collect();
            self.repo.write_index(&outcome.index)?;
            self.state.status = RebaseStatus::PausedOnConflict;
            self.state.current = Some(index);
            self.state.next = index + 1;
            let original = op.original.to_hex();
            self.journal_step(|j, p| j.append_conflict_paused(p, index, original, paths))?;
            self.set_phase(OpPhase::Paused)?;
            self.save()?;
            debug!(original = %op.original, "rebase paused on conflict");
            return Ok(Some(RebaseStep::Conflicted(op, outcome.index)));
        }

        let tree = outcome.write_tree(odb)?;
        self.state.next = index + 1;
        let step = if tree == odb.peel_to_tree(&self.state.tip)? {
            self.mark_skipped(index)?;
            RebaseStep::Skipped(self.state.operations[index].clone())
        } else {
            let oid = self.replay(index, &tree)?;
            RebaseStep::Applied(self.state.operations[index].clone(), oid)
        };
        self.save()?;
        Ok(Some(step))
    }

    fn mark_skipped(&mut self, index: usize) -> Result<()> {
        self.state.operations[index].skipped = true;
        let original = self.state.operations[index].original;
        debug!(%original, "rebase skipping commit");
        self.journal_step(|j, p| j.append_operation_skipped(p, index, original.to_hex()))?;
        Ok(())
    }

    /// Commit `tree` as the rewrite of operation `index` on top of the tip.
    fn replay(&mut self, index: usize, tree: &Oid) -> Result<Oid> {
        let odb = self.repo.odb();
        let original = odb.find_commit(&self.state.operations[index].original)?;
        let commit = Commit {
            tree: *tree,
            parents: vec![self.state.tip],
            committer: self.committer()?,
            ..original
        };
        let oid = odb.write_commit(&commit)?;
        self.state.tip = oid;
        self.state.operations[index].rewritten = Some(oid);
        self.move_head(oid, &format!("rebase: {}", commit.summary()))?;
        let original = self.state.operations[index].original.to_hex();
        let rewritten = oid.to_hex();
        self.journal_step(|j, p| j.append_commit_rewritten(p, index, original, rewritten))?;
        Ok(oid)
    }

    fn leave_pause(&mut self) -> Result<()> {
        self.state.status = RebaseStatus::Running;
        self.state.current = None;
        self.journal_step(|j, p| j.resume(p))?;
        self.set_phase(OpPhase::InProgress)
    }

    /// Commit the resolved index for the paused operation.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless paused, or when the resolution is empty
    ///   (use [`Rebase::skip`])
    /// - `Conflict` while the index still has conflicts
    pub fn commit(&mut self, committer: Option<&Signature>) -> Result<Oid> {
        self.require(&[RebaseStatus::PausedOnConflict], "commit in")?;
        let index = self.state.current.ok_or_else(|| {
            Error::InvalidState("paused rebase has no current operation".to_string())
        })?;
        let tree = self.repo.index()?.write_tree(self.repo.odb())?;
        if tree == self.repo.odb().peel_to_tree(&self.state.tip)? {
            return Err(Error::InvalidState(format!(
                "resolution of {} is empty; skip it instead",
                self.state.operations[index].original
            )));
        }
        if let Some(sig) = committer {
            self.state.committer = Some(sig.clone());
        }
        let oid = self.replay(index, &tree)?;
        self.leave_pause()?;
        self.save()?;
        Ok(oid)
    }

    /// Finish the paused operation (committing the resolution, or skipping
    /// it when the resolution is empty) and apply the next one.
    pub fn resume(&mut self, committer: Option<&Signature>) -> Result<Option<RebaseStep>> {
        if self.state.status == RebaseStatus::PausedOnConflict {
            let tree = self.repo.index()?.write_tree(self.repo.odb())?;
            if tree == self.repo.odb().peel_to_tree(&self.state.tip)? {
                self.skip()?;
            } else {
                self.commit(committer)?;
            }
        }
        self.next()
    }

    /// Drop the paused operation and restore the index to the tip.
    pub fn skip(&mut self) -> Result<()> {
        self.require(&[RebaseStatus::PausedOnConflict], "skip in")?;
        let index = self.state.current.ok_or_else(|| {
            Error::InvalidState("paused rebase has no current operation".to_string())
        })?;
        self.mark_skipped(index)?;
        self.move_head(self.state.tip, "rebase: skip")?;
        self.leave_pause()?;
        self.save()
    }

    /// Stop the rebase and put HEAD back on the original branch.
    ///
    /// The branch only moves in [`Rebase::finish`], so it is left where it
    /// is, including when someone else moved it during a pause. Ref moves
    /// recorded by an interrupted `finish` are undone with CAS.
    ///
    /// # Errors
    ///
    /// `Conflict` when a recorded ref moved again since this rebase set it.
    pub fn abort(&mut self) -> Result<()> {
        self.require(
            &[RebaseStatus::Idle, RebaseStatus::Running, RebaseStatus::PausedOnConflict],
            "abort",
        )?;
        self.undo_ref_updates()?;
        let refs = self.repo.refs();
        let head = match &self.state.branch {
            Some(branch) => {
                refs.set_symbolic(&RefName::head(), branch, "rebase: aborting")?;
                refs.resolve(branch)?
            }
            None => {
                refs.detach_head(self.state.orig_head, "rebase: aborting")?;
                self.state.orig_head
            }
        };
        let tree = self.repo.odb().peel_to_tree(&head)?;
        self.repo.write_index(&Index::from_tree(self.repo.odb(), &tree)?)?;
        self.state.status = RebaseStatus::Aborted;
        self.close(false)?;
        debug!(%head, "rebase aborted");
        Ok(())
    }

    fn undo_ref_updates(&self) -> Result<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let refs = self.repo.refs();
        for step in journal.ref_updates_for_rollback() {
            let StepKind::RefUpdate {
                refname,
                old_oid,
                new_oid,
            } = step
            else {
                continue;
            };
            let name = RefName::new(refname.as_str())?;
            let new = Oid::from_hex(new_oid)?;
            match old_oid {
                Some(old) => {
                    refs.compare_and_swap(&name, Some(new), Oid::from_hex(old)?, "rebase: aborting")?
                }
                None => refs.delete(&name, Some(new))?,
            }
            debug!(refname = %name, "rolled back ref update");
        }
        Ok(())
    }

    /// Move the branch to the rewritten history and reattach HEAD.
    ///
    /// # Errors
    ///
    /// `InvalidState` while operations remain or a conflict is pending;
    /// `Conflict` when the branch moved since the rebase started.
    pub fn finish(&mut self) -> Result<Oid> {
        self.require(&[RebaseStatus::Idle, RebaseStatus::Running], "finish")?;
        if self.state.next < self.state.operations.len() {
            return Err(Error::InvalidState(format!(
                "{} operations remain",
                self.state.operations.len() - self.state.next
            )));
        }
        let refs = self.repo.refs();
        let tip = self.state.tip;
        match &self.state.branch {
            Some(branch) => {
                let message = format!("rebase finished: {branch} onto {}", self.state.onto);
                refs.compare_and_swap(branch, Some(self.state.orig_head), tip, &message)?;
                refs.set_symbolic(&RefName::head(), branch, &message)?;
                if let Some(paths) = self.repo.paths() {
                    if let Some(journal) = self.journal.as_mut() {
                        journal.append_ref_update(
                            paths,
                            branch.as_str(),
                            Some(self.state.orig_head.to_hex()),
                            tip.to_hex(),
                        )?;
                    }
                }
            }
            None => refs.detach_head(tip, "rebase finished")?,
        }
        self.state.status = RebaseStatus::Completed;
        self.close(true)?;
        debug!(%tip, "rebase finished");
        Ok(tip)
    }

    fn close(&mut self, committed: bool) -> Result<()> {
        if let (Some(journal), Some(paths)) = (self.journal.as_mut(), self.repo.paths()) {
            if committed {
                journal.commit(paths)?;
            } else {
                journal.rollback(paths)?;
            }
            OpState::remove(paths)?;
        }
        self.repo.store_rebase_state(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FileMode, HashAlgorithm, Time};
    use crate::error::ErrorKind;
    use crate::index::Stage;
    use crate::object::TreeUpdater;
    use crate::repo::{InitOptions, RepositoryState};

    fn sig(time: i64) -> Signature {
        Signature::new("Ada", "ada@example.com", Time::new(time, 0)).unwrap()
    }

    fn options() -> RebaseOptions {
        RebaseOptions {
            committer: Some(sig(100)),
            ..RebaseOptions::default()
        }
    }

    struct History<'a> {
        repo: &'a Repository,
        time: i64,
    }

    impl<'a> History<'a> {
        fn commit(&mut self, branch: &str, parent: Option<Oid>, files: &[(&str, &str)], msg: &str) -> Oid {
            let mut updater = TreeUpdater::new(self.repo.odb());
            for (path, content) in files {
                let oid = self.repo.odb().write_blob(content.as_bytes()).unwrap();
                updater.upsert(*path, FileMode::Blob, oid);
            }
            let tree = updater.apply(None).unwrap();
            self.time += 1;
            let name = RefName::new(format!("refs/heads/{branch}")).unwrap();
            let parents: Vec<Oid> = parent.into_iter().collect();
            self.repo
                .commit(Some(&name), &sig(self.time), &sig(self.time), msg, &tree, &parents)
                .unwrap()
        }
    }

    fn topic() -> RefName {
        RefName::new("refs/heads/topic").unwrap()
    }

    /// main: base -> m1 (edits a); topic: base -> t1 (adds b) -> t2 (edits b)
    fn setup(repo: &Repository) -> (Oid, Oid, Oid) {
        let mut h = History { repo, time: 0 };
        let base = h.commit("main", None, &[("a", "1\n")], "base");
        let m1 = h.commit("main", Some(base), &[("a", "2\n")], "m1");
        repo.refs().create(&topic(), base, false, "branch").unwrap();
        let t1 = h.commit("topic", Some(base), &[("a", "1\n"), ("b", "x\n")], "t1");
        let t2 = h.commit("topic", Some(t1), &[("a", "1\n"), ("b", "y\n")], "t2");
        repo.refs()
            .set_symbolic(&RefName::head(), &topic(), "checkout")
            .unwrap();
        (base, m1, t2)
    }

    fn run(rebase: &mut Rebase<'_>) -> Vec<RebaseStep> {
        let mut steps = Vec::new();
        while let Some(step) = rebase.next().unwrap() {
            let stop = matches!(step, RebaseStep::Conflicted(..));
            steps.push(step);
            if stop {
                break;
            }
        }
        steps
    }

    #[test]
    fn clean_rebase_rewrites_branch() {
        let repo = Repository::in_memory(HashAlgorithm::Sha1);
        let (_, m1, t2) = setup(&repo);
        let mut rebase = Rebase::init(&repo, None, &m1, None, options()).unwrap();
        assert_eq!(rebase.status(), RebaseStatus::Idle);
        assert_eq!(rebase.operations().len(), 2);
        assert_eq!(repo.state().unwrap(), RepositoryState::Rebase);

        let steps = run(&mut rebase);
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|s| matches!(s, RebaseStep::Applied(..))));
        let tip = rebase.finish().unwrap();
        assert_eq!(rebase.status(), RebaseStatus::Completed);

        assert_eq!(repo.refs().resolve(&topic()).unwrap(), tip);
        assert_eq!(repo.head().unwrap().branch, Some(topic()));
        let rewritten = repo.find_commit(&tip).unwrap();
        assert_eq!(rewritten.message, b"t2\n");
        assert_eq!(rewritten.author, sig(4));
        assert_eq!(repo.revparse("topic~2").unwrap(), m1);
        assert_ne!(tip, t2);
        let tree = repo.revparse("topic^{tree}").unwrap();
        let a = repo.find_tree(&tree).unwrap();
        assert!(a.get("a").is_some() && a.get("b").is_some());
        assert_eq!(repo.state().unwrap(), RepositoryState::Clean);
        assert_eq!(rebase.next().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn conflict_pauses_then_commit_resumes() {
        let repo = Repository::in_memory(HashAlgorithm::Sha1);
        let mut h = History { repo: &repo, time: 0 };
        let base = h.commit("main", None, &[("f", "base\n")], "base");
        let m1 = h.commit("main", Some(base), &[("f", "main\n")], "m1");
        repo.refs().create(&topic(), base, false, "branch").unwrap();
        h.commit("topic", Some(base), &[("f", "topic\n")], "t1");
        repo.refs().set_symbolic(&RefName::head(), &topic(), "checkout").unwrap();

        let mut rebase = Rebase::init(&repo, None, &m1, None, options()).unwrap();
        let steps = run(&mut rebase);
        let Some(RebaseStep::Conflicted(op, index)) = steps.last() else {
            panic!("expected a conflict, got {steps:?}");
        };
        assert_eq!(op.summary, "t1");
        assert!(index.is_conflicted("f"));
        assert_eq!(rebase.status(), RebaseStatus::PausedOnConflict);
        assert_eq!(rebase.next().unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(rebase.finish().unwrap_err().kind(), ErrorKind::InvalidState);

        // Unresolved index cannot be committed.
        assert_eq!(rebase.commit(None).unwrap_err().kind(), ErrorKind::Conflict);

        let mut resolved = repo.index().unwrap();
        let blob = repo.odb().write_blob(b"merged\n").unwrap();
        resolved.resolve("f", FileMode::Blob, blob).unwrap();
        repo.write_index(&resolved).unwrap();

        // Reopen from persisted state, as a second process would.
        let mut reopened = Rebase::open(&repo, MergeOptions::default()).unwrap();
        assert_eq!(reopened.current().map(|o| o.summary.as_str()), Some("t1"));
        reopened.commit(None).unwrap();
        assert!(reopened.next().unwrap().is_none());
        let tip = reopened.finish().unwrap();
        let content = repo.find_tree(&repo.find_commit(&tip).unwrap().tree).unwrap();
        assert_eq!(content.get("f").unwrap().oid, blob);
        assert!(repo.index().unwrap().get("f", Stage::Normal).is_some());
    }

    #[test]
    fn already_applied_changes_are_skipped() {
        let repo = Repository::in_memory(HashAlgorithm::Sha1);
        let mut h = History { repo: &repo, time: 0 };
        let base = h.commit("main", None, &[("f", "1\n")], "base");
        let m1 = h.commit("main", Some(base), &[("f", "2\n")], "same change");
        repo.refs().create(&topic(), base, false, "branch").unwrap();
        h.commit("topic", Some(base), &[("f", "2\n")], "same change");
        repo.refs().set_symbolic(&RefName::head(), &topic(), "checkout").unwrap();

        let mut rebase = Rebase::init(&repo, None, &m1, None, options()).unwrap();
        let steps = run(&mut rebase);
        assert!(matches!(steps.as_slice(), [RebaseStep::Skipped(_)]));
        assert_eq!(rebase.finish().unwrap(), m1);
    }

    #[test]
    fn abort_restores_head_and_skip_drops_operation() {
        let repo = Repository::in_memory(HashAlgorithm::Sha1);
        let mut h = History { repo: &repo, time: 0 };
        let base = h.commit("main", None, &[("f", "base\n")], "base");
        let m1 = h.commit("main", Some(base), &[("f", "main\n")], "m1");
        repo.refs().create(&topic(), base, false, "branch").unwrap();
        let t1 = h.commit("topic", Some(base), &[("f", "topic\n")], "t1");
        repo.refs().set_symbolic(&RefName::head(), &topic(), "checkout").unwrap();

        let mut rebase = Rebase::init(&repo, None, &m1, None, options()).unwrap();
        run(&mut rebase);
        rebase.abort().unwrap();
        assert_eq!(repo.head().unwrap().oid, t1);
        assert_eq!(repo.head().unwrap().branch, Some(topic()));
        assert_eq!(rebase.abort().unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(repo.state().unwrap(), RepositoryState::Clean);

        let mut rebase = Rebase::init(&repo, None, &m1, None, options()).unwrap();
        run(&mut rebase);
        rebase.skip().unwrap();
        assert!(rebase.operations()[0].skipped);
        assert!(rebase.next().unwrap().is_none());
        assert_eq!(rebase.finish().unwrap(), m1);
    }

    #[test]
    fn abort_keeps_branch_moved_during_pause() {
        let repo = Repository::in_memory(HashAlgorithm::Sha1);
        let mut h = History { repo: &repo, time: 0 };
        let base = h.commit("main", None, &[("f", "base\n")], "base");
        let m1 = h.commit("main", Some(base), &[("f", "main\n")], "m1");
        repo.refs().create(&topic(), base, false, "branch").unwrap();
        let t1 = h.commit("topic", Some(base), &[("f", "topic\n")], "t1");

        let mut rebase = Rebase::init(&repo, Some(&topic()), &m1, None, options()).unwrap();
        assert!(matches!(run(&mut rebase).last(), Some(RebaseStep::Conflicted(..))));

        // Someone else moves the branch while the rebase is paused.
        let moved = h.commit("topic", Some(t1), &[("f", "elsewhere\n")], "moved");
        rebase.abort().unwrap();

        assert_eq!(repo.refs().resolve(&topic()).unwrap(), moved);
        let head = repo.head().unwrap();
        assert_eq!((head.oid, head.branch), (moved, Some(topic())));
        let index = repo.index().unwrap();
        assert!(!index.has_conflicts());
        assert_eq!(index.write_tree(repo.odb()).unwrap(), repo.odb().peel_to_tree(&moved).unwrap());
    }

    #[test]
    fn abort_undoes_branch_move_of_interrupted_finish() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), &InitOptions::default()).unwrap();
        let (_, m1, t2) = setup(&repo);
        let paths = repo.paths().unwrap().clone();

        let mut rebase = Rebase::init(&repo, Some(&topic()), &m1, None, options()).unwrap();
        run(&mut rebase);
        // The first half of finish: branch moved and recorded, state not yet cleared.
        let tip = rebase.tip();
        repo.refs().compare_and_swap(&topic(), Some(t2), tip, "finish").unwrap();
        rebase
            .journal
            .as_mut()
            .unwrap()
            .append_ref_update(&paths, topic().as_str(), Some(t2.to_hex()), tip.to_hex())
            .unwrap();

        rebase.abort().unwrap();
        assert_eq!(repo.refs().resolve(&topic()).unwrap(), t2);
        assert_eq!(repo.head().unwrap().oid, t2);
        assert!(!OpState::exists(&paths));
    }

    #[test]
    fn abort_refuses_to_undo_a_ref_moved_again() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), &InitOptions::default()).unwrap();
        let (base, m1, t2) = setup(&repo);
        let paths = repo.paths().unwrap().clone();

        let mut rebase = Rebase::init(&repo, Some(&topic()), &m1, None, options()).unwrap();
        run(&mut rebase);
        let tip = rebase.tip();
        repo.refs().compare_and_swap(&topic(), Some(t2), tip, "finish").unwrap();
        rebase
            .journal
            .as_mut()
            .unwrap()
            .append_ref_update(&paths, topic().as_str(), Some(t2.to_hex()), tip.to_hex())
            .unwrap();
        repo.refs().compare_and_swap(&topic(), Some(tip), base, "elsewhere").unwrap();

        assert_eq!(rebase.abort().unwrap_err().kind(), ErrorKind::Conflict);
        assert_eq!(repo.refs().resolve(&topic()).unwrap(), base);
    }

    #[test]
    fn second_rebase_is_rejected() {
        let repo = Repository::in_memory(HashAlgorithm::Sha1);
        let (_, m1, _) = setup(&repo);
        let _first = Rebase::init(&repo, None, &m1, None, options()).unwrap();
        let err = Rebase::init(&repo, None, &m1, None, options()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn on_disk_rebase_is_journaled() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), &InitOptions::default()).unwrap();
        let (_, m1, _) = setup(&repo);
        let paths = repo.paths().unwrap().clone();

        let mut rebase = Rebase::init(&repo, Some(&topic()), &m1, None, options()).unwrap();
        assert!(OpState::exists(&paths));
        assert!(paths.rebase_state_path().exists());
        run(&mut rebase);
        rebase.finish().unwrap();

        assert!(!OpState::exists(&paths));
        assert!(!paths.rebase_state_path().exists());
        let journal = Journal::most_recent(&paths).unwrap().unwrap();
        assert_eq!(journal.command, "rebase");
        assert_eq!(journal.phase, OpPhase::Committed);
        assert_eq!(journal.rewritten_count(), 2);
    }
}
