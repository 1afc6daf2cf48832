//! core::ops::journal
//!
//! Operation journaling for multi-step operations (rebase).
//!
//! # Crash Safety Contract
//!
//! 1. **Per-step persistence:** Every `append_*` method writes to disk with
//!    fsync before returning. A crash at any point leaves the journal in a
//!    consistent state.
//! 2. **Recoverability:** After a crash, [`Journal::read`] returns the journal
//!    as it was after the last successful `append_*` call.
//! 3. **Rollback support:** Every reference move is recorded with its
//!    before/after ids, see [`Journal::ref_updates_for_rollback`].
//!
//! # Storage
//!
//! - `<repo>/ops/<op_id>.json` - journal files, rewritten with fsync per step
//! - `<repo>/op-state.json` - marker naming the operation in progress
//!
//! # Usage
//!
//! ```no_run
//! use grove::core::ops::journal::Journal;
//! use grove::core::paths::RepoPaths;
//! use std::path::PathBuf;
//!
//! let paths = RepoPaths::new(PathBuf::from("/work/.grove"));
//! let mut journal = Journal::new("rebase");
//! journal.append_checkpoint(&paths, "start")?;
//! journal.append_ref_update(&paths, "refs/heads/topic", Some("aaaa".into()), "bbbb")?;
//! journal.commit(&paths)?;
//! # Ok::<(), grove::core::ops::journal::JournalError>(())
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::paths::RepoPaths;
use crate::core::types::UtcTimestamp;

/// Errors from journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("journal not found: {0}")]
    NotFound(String),

    #[error("invalid journal state: {0}")]
    InvalidState(String),
}

/// Unique identifier for an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpId(String);

impl OpId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OpId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phase of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpPhase {
    InProgress,
    /// Stopped waiting for the caller (conflict resolution).
    Paused,
    Committed,
    RolledBack,
}

impl OpPhase {
    pub fn is_finished(&self) -> bool {
        matches!(self, OpPhase::Committed | OpPhase::RolledBack)
    }

    pub fn is_resumable(&self) -> bool {
        matches!(self, OpPhase::Paused)
    }
}

/// A single step in an operation journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalStep {
    pub kind: StepKind,
    pub timestamp: UtcTimestamp,
}

/// The kind of journal step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// A ref moved from `old_oid` (None when created) to `new_oid`.
    RefUpdate {
        refname: String,
        old_oid: Option<String>,
        new_oid: String,
    },

    /// An operation replayed cleanly and produced a new commit.
    CommitRewritten {
        index: usize,
        original: String,
        rewritten: String,
    },

    /// An operation was dropped (empty after replay, or skipped by the caller).
    OperationSkipped { index: usize, original: String },

    /// Replay stopped on conflicts in `paths`.
    ConflictPaused {
        index: usize,
        original: String,
        paths: Vec<String>,
    },

    /// A named marker in a multi-step operation.
    Checkpoint { name: String },
}

/// An operation journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub op_id: OpId,
    /// Command that started this operation.
    pub command: String,
    pub started_at: UtcTimestamp,
    pub finished_at: Option<UtcTimestamp>,
    pub phase: OpPhase,
    pub steps: Vec<JournalStep>,
}

impl Journal {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            op_id: OpId::new(),
            command: command.into(),
            started_at: UtcTimestamp::now(),
            finished_at: None,
            phase: OpPhase::InProgress,
            steps: vec![],
        }
    }

    fn push(&mut self, kind: StepKind) {
        self.steps.push(JournalStep {
            kind,
            timestamp: UtcTimestamp::now(),
        });
    }

    /// Record a ref update and persist.
    pub fn append_ref_update(
        &mut self,
        paths: &RepoPaths,
        refname: impl Into<String>,
        old_oid: Option<String>,
        new_oid: impl Into<String>,
    ) -> Result<(), JournalError> {
        self.push(StepKind::RefUpdate {
            refname: refname.into(),
            old_oid,
            new_oid: new_oid.into(),
        });
        self.write(paths)
    }

    /// Record a replayed commit and persist.
    pub fn append_commit_rewritten(
        &mut self,
        paths: &RepoPaths,
        index: usize,
        original: impl Into<String>,
        rewritten: impl Into<String>,
    ) -> Result<(), JournalError> {
        self.push(StepKind::CommitRewritten {
            index,
            original: original.into(),
            rewritten: rewritten.into(),
        });
        self.write(paths)
    }

    pub fn append_operation_skipped(
        &mut self,
        paths: &RepoPaths,
        index: usize,
        original: impl Into<String>,
    ) -> Result<(), JournalError> {
        self.push(StepKind::OperationSkipped {
            index,
            original: original.into(),
        });
        self.write(paths)
    }

    /// Record a conflict stop, mark the journal paused, and persist.
    pub fn append_conflict_paused(
        &mut self,
        paths: &RepoPaths,
        index: usize,
        original: impl Into<String>,
        conflicted: Vec<String>,
    ) -> Result<(), JournalError> {
        self.push(StepKind::ConflictPaused {
            index,
            original: original.into(),
            paths: conflicted,
        });
        self.phase = OpPhase::Paused;
        self.write(paths)
    }

    pub fn append_checkpoint(
        &mut self,
        paths: &RepoPaths,
        name: impl Into<String>,
    ) -> Result<(), JournalError> {
        self.push(StepKind::Checkpoint { name: name.into() });
        self.write(paths)
    }

    /// Return to `InProgress` after a pause and persist.
    pub fn resume(&mut self, paths: &RepoPaths) -> Result<(), JournalError> {
        if !self.phase.is_resumable() {
            return Err(JournalError::InvalidState(format!(
                "cannot resume a journal in phase {:?}",
                self.phase
            )));
        }
        self.phase = OpPhase::InProgress;
        self.write(paths)
    }

    /// Mark the operation as committed and persist.
    pub fn commit(&mut self, paths: &RepoPaths) -> Result<(), JournalError> {
        self.finish(paths, OpPhase::Committed)
    }

    /// Mark the operation as rolled back and persist.
    pub fn rollback(&mut self, paths: &RepoPaths) -> Result<(), JournalError> {
        self.finish(paths, OpPhase::RolledBack)
    }

    fn finish(&mut self, paths: &RepoPaths, phase: OpPhase) -> Result<(), JournalError> {
        if self.phase.is_finished() {
            return Err(JournalError::InvalidState(format!(
                "operation {} already finished",
                self.op_id
            )));
        }
        self.phase = phase;
        self.finished_at = Some(UtcTimestamp::now());
        self.write(paths)
    }

    /// Write the journal to disk with fsync.
    pub fn write(&self, paths: &RepoPaths) -> Result<(), JournalError> {
        #[cfg(any(test, feature = "fault_injection"))]
        if fault_injection::should_crash() {
            return Err(JournalError::Io(std::io::Error::other(
                "simulated crash for fault injection testing",
            )));
        }

        let content = serde_json::to_string_pretty(self)?;
        write_durable(&paths.op_journal_path(self.op_id.as_str()), content.as_bytes())?;
        Ok(())
    }

    pub fn read(paths: &RepoPaths, op_id: &OpId) -> Result<Self, JournalError> {
        let path = paths.op_journal_path(op_id.as_str());
        if !path.exists() {
            return Err(JournalError::NotFound(op_id.to_string()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Journal ids, newest first.
    pub fn list(paths: &RepoPaths) -> Result<Vec<OpId>, JournalError> {
        let dir = paths.ops_dir();
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut entries: Vec<_> = fs::read_dir(&dir)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().into_string().ok()?;
                let id = name.strip_suffix(".json")?;
                let mtime = entry.metadata().ok()?.modified().ok()?;
                Some((OpId::from_string(id), mtime))
            })
            .collect();

        entries.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(entries.into_iter().map(|(id, _)| id).collect())
    }

    pub fn most_recent(paths: &RepoPaths) -> Result<Option<Self>, JournalError> {
        match Self::list(paths)?.first() {
            Some(id) => Ok(Some(Self::read(paths, id)?)),
            None => Ok(None),
        }
    }

    /// Ref updates in reverse order, for undoing the operation.
    pub fn ref_updates_for_rollback(&self) -> Vec<&StepKind> {
        self.steps
            .iter()
            .rev()
            .map(|step| &step.kind)
            .filter(|kind| matches!(kind, StepKind::RefUpdate { .. }))
            .collect()
    }

    /// Number of operations that produced a rewritten commit.
    pub fn rewritten_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step.kind, StepKind::CommitRewritten { .. }))
            .count()
    }
}

/// Marker naming the operation in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpState {
    pub op_id: OpId,
    pub command: String,
    pub phase: OpPhase,
    pub updated_at: UtcTimestamp,
}

impl OpState {
    pub fn from_journal(journal: &Journal) -> Self {
        Self {
            op_id: journal.op_id.clone(),
            command: journal.command.clone(),
            phase: journal.phase,
            updated_at: UtcTimestamp::now(),
        }
    }

    pub fn write(&self, paths: &RepoPaths) -> Result<(), JournalError> {
        let content = serde_json::to_string_pretty(self)?;
        write_durable(&paths.op_state_path(), content.as_bytes())?;
        Ok(())
    }

    /// Read the marker, if an operation is in progress.
    pub fn read(paths: &RepoPaths) -> Result<Option<Self>, JournalError> {
        let path = paths.op_state_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn remove(paths: &RepoPaths) -> Result<(), JournalError> {
        let path = paths.op_state_path();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    pub fn exists(paths: &RepoPaths) -> bool {
        paths.op_state_path().exists()
    }

    pub fn update_phase(&mut self, phase: OpPhase, paths: &RepoPaths) -> Result<(), JournalError> {
        self.phase = phase;
        self.updated_at = UtcTimestamp::now();
        self.write(paths)
    }
}

/// Replace `path` with `content`: write a sibling temp file, fsync, rename.
pub(crate) fn write_durable(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    if let Err(err) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(err);
    }
    if let Some(parent) = path.parent() {
        // Directory fsync is best-effort; not every platform allows opening a directory.
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Fault injection support for testing crash recovery.
///
/// Uses thread-local counters so parallel tests do not interfere.
///
/// ```ignore
/// fault_injection::set_crash_after(2);
/// journal.append_checkpoint(&paths, "a")?; // succeeds
/// assert!(journal.append_checkpoint(&paths, "b").is_err());
/// fault_injection::reset();
/// ```
#[cfg(any(test, feature = "fault_injection"))]
pub mod fault_injection {
    use std::cell::Cell;

    thread_local! {
        /// 0 disables crash simulation.
        static CRASH_AFTER_WRITES: Cell<usize> = const { Cell::new(0) };
        static WRITE_COUNT: Cell<usize> = const { Cell::new(0) };
    }

    /// Fail the `n`th journal write from now on. 0 disables.
    pub fn set_crash_after(n: usize) {
        CRASH_AFTER_WRITES.with(|c| c.set(n));
        WRITE_COUNT.with(|c| c.set(0));
    }

    /// Called by `Journal::write` before each write.
    pub fn should_crash() -> bool {
        CRASH_AFTER_WRITES.with(|threshold_cell| {
            let threshold = threshold_cell.get();
            if threshold == 0 {
                return false;
            }
            WRITE_COUNT.with(|count_cell| {
                let count = count_cell.get() + 1;
                count_cell.set(count);
                count >= threshold
            })
        })
    }

    pub fn reset() {
        CRASH_AFTER_WRITES.with(|c| c.set(0));
        WRITE_COUNT.with(|c| c.set(0));
    }

    pub fn write_count() -> usize {
        WRITE_COUNT.with(|c| c.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_paths(temp: &TempDir) -> RepoPaths {
        RepoPaths::new(temp.path().to_path_buf())
    }

    #[test]
    fn op_ids_are_unique() {
        assert_ne!(OpId::new(), OpId::new());
        assert_eq!(OpId::from_string("x").to_string(), "x");
    }

    #[test]
    fn phase_predicates() {
        assert!(OpPhase::Paused.is_resumable());
        assert!(!OpPhase::InProgress.is_resumable());
        assert!(OpPhase::Committed.is_finished());
        assert!(OpPhase::RolledBack.is_finished());
    }

    #[test]
    fn every_append_is_persisted() {
        let temp = TempDir::new().unwrap();
        let paths = test_paths(&temp);
        let mut journal = Journal::new("rebase");

        journal.append_checkpoint(&paths, "start").unwrap();
        journal
            .append_commit_rewritten(&paths, 0, "aaaa", "bbbb")
            .unwrap();
        let on_disk = Journal::read(&paths, &journal.op_id).unwrap();
        assert_eq!(on_disk.steps.len(), 2);
        assert_eq!(on_disk.rewritten_count(), 1);
    }

    #[test]
    fn conflict_pauses_and_resume_continues() {
        let temp = TempDir::new().unwrap();
        let paths = test_paths(&temp);
        let mut journal = Journal::new("rebase");

        journal
            .append_conflict_paused(&paths, 1, "cccc", vec!["a.txt".into()])
            .unwrap();
        assert_eq!(Journal::read(&paths, &journal.op_id).unwrap().phase, OpPhase::Paused);

        journal.resume(&paths).unwrap();
        assert!(journal.resume(&paths).is_err());
        journal.commit(&paths).unwrap();
        assert!(journal.rollback(&paths).is_err());
    }

    #[test]
    fn rollback_order_is_reversed() {
        let temp = TempDir::new().unwrap();
        let paths = test_paths(&temp);
        let mut journal = Journal::new("rebase");
        journal
            .append_ref_update(&paths, "refs/heads/a", None, "1111")
            .unwrap();
        journal.append_checkpoint(&paths, "mid").unwrap();
        journal
            .append_ref_update(&paths, "refs/heads/b", Some("2222".into()), "3333")
            .unwrap();

        let updates = journal.ref_updates_for_rollback();
        assert_eq!(updates.len(), 2);
        assert!(matches!(updates[0], StepKind::RefUpdate { refname, .. } if refname == "refs/heads/b"));
    }

    #[test]
    fn read_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let result = Journal::read(&test_paths(&temp), &OpId::from_string("nope"));
        assert!(matches!(result, Err(JournalError::NotFound(_))));
    }

    #[test]
    fn op_state_marker_lifecycle() {
        let temp = TempDir::new().unwrap();
        let paths = test_paths(&temp);
        let journal = Journal::new("rebase");

        assert!(OpState::read(&paths).unwrap().is_none());
        let mut state = OpState::from_journal(&journal);
        state.write(&paths).unwrap();
        assert!(OpState::exists(&paths));
        state.update_phase(OpPhase::Paused, &paths).unwrap();
        assert_eq!(OpState::read(&paths).unwrap().unwrap().phase, OpPhase::Paused);
        OpState::remove(&paths).unwrap();
        assert!(!OpState::exists(&paths));
    }

    #[test]
    fn simulated_crash_keeps_last_good_state() {
        let temp = TempDir::new().unwrap();
        let paths = test_paths(&temp);
        let mut journal = Journal::new("rebase");

        fault_injection::set_crash_after(2);
        journal.append_checkpoint(&paths, "one").unwrap();
        assert!(journal.append_checkpoint(&paths, "two").is_err());
        fault_injection::reset();

        let recovered = Journal::read(&paths, &journal.op_id).unwrap();
        assert_eq!(recovered.steps.len(), 1);
    }

    #[test]
    fn write_durable_replaces_atomically() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/file.json");
        write_durable(&path, b"first").unwrap();
        write_durable(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
