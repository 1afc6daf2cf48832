//! core::ops
//!
//! Operation journaling and locking.
//!
//! # Modules
//!
//! - [`journal`] - Operation journal for multi-step operations
//! - [`lock`] - Exclusive file locks
//!
//! # Architecture
//!
//! Reference and index mutations take a [`FileLock`] for their
//! read-compare-write cycle. Multi-step operations (rebase) additionally:
//! 1. Create a [`Journal`] and an [`OpState`] marker before the first step
//! 2. Append each step with fsync as it happens
//! 3. Commit or roll back the journal and remove the marker when done

pub mod journal;
pub mod lock;

pub use journal::{Journal, JournalError, OpId, OpPhase, OpState, StepKind};
pub use lock::{FileLock, LockError};
