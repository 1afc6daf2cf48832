//! error
//!
//! Crate-wide error type.
//!
//! Every fallible operation in the library returns [`Result`]. Each
//! variant maps onto one [`ErrorKind`] so callers can branch on the
//! category without matching individual variants.
//!
//! A few outcomes are deliberately *not* errors:
//! - The end of a revision walk is `Ok(None)`.
//! - A merge that produced conflicts is a successful result carrying an
//!   index with conflict entries.
//! - A rebase step that stopped on a conflict is a paused state.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::ops::journal::JournalError;
use crate::core::ops::lock::LockError;
use crate::core::types::{ObjectType, Oid, TypeError};

/// Shorthand for results produced by this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An id, reference or path does not exist.
    NotFound,
    /// An abbreviated id or name matched more than one candidate.
    Ambiguous,
    /// A compare-and-swap precondition failed, the target already exists,
    /// or conflicts block the operation.
    Conflict,
    /// A malformed name, path or revision expression.
    InvalidSpec,
    /// Stored bytes do not decode per the canonical format.
    Corrupt,
    /// A tree or commit refers to an object missing from the store.
    DanglingReference,
    /// HEAD refers to a branch that has no commits yet.
    Unborn,
    /// An id resolved to an object of the wrong type.
    InvalidTarget,
    /// A revision walk was advanced before any starting point was pushed.
    NotPrimed,
    /// Another process holds a repository lock.
    Locked,
    /// A cooperative cancellation flag was raised.
    Interrupted,
    /// A state machine received an operation invalid in its current state.
    InvalidState,
    /// Configuration could not be loaded or is invalid.
    Config,
    /// Underlying I/O failure.
    Io,
}

/// Errors produced by the object store, references, index, walker, diff,
/// merge and rebase machinery.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("ambiguous {what} '{name}': {candidates} candidates")]
    Ambiguous {
        what: &'static str,
        name: String,
        candidates: usize,
    },

    #[error("{what} already exists: {name}")]
    Exists { what: &'static str, name: String },

    /// Compare-and-swap precondition failed.
    #[error("CAS failed for {refname}: expected {expected}, found {actual}")]
    CasFailed {
        refname: String,
        expected: String,
        actual: String,
    },

    /// The operation cannot proceed while conflicts remain.
    #[error("unresolved conflicts: {0}")]
    Conflicted(String),

    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    #[error("corrupt {what}: {message}")]
    Corrupt { what: String, message: String },

    #[error("dangling reference: {from} refers to missing object {missing}")]
    DanglingReference { from: String, missing: Oid },

    #[error("reference '{0}' is unborn")]
    Unborn(String),

    #[error("object {oid} is a {actual}, expected {expected}")]
    InvalidTarget {
        oid: Oid,
        expected: ObjectType,
        actual: ObjectType,
    },

    #[error("revision walk has no starting point")]
    NotPrimed,

    #[error("operation interrupted")]
    Interrupted,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("i/o error at {path}: {source}")]
    Path {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Ambiguous { .. } => ErrorKind::Ambiguous,
            Error::Exists { .. } | Error::CasFailed { .. } | Error::Conflicted(_) => {
                ErrorKind::Conflict
            }
            Error::InvalidSpec(_) | Error::Type(_) => ErrorKind::InvalidSpec,
            Error::Corrupt { .. } => ErrorKind::Corrupt,
            Error::DanglingReference { .. } => ErrorKind::DanglingReference,
            Error::Unborn(_) => ErrorKind::Unborn,
            Error::InvalidTarget { .. } => ErrorKind::InvalidTarget,
            Error::NotPrimed => ErrorKind::NotPrimed,
            Error::Interrupted => ErrorKind::Interrupted,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Lock(LockError::AlreadyLocked) => ErrorKind::Locked,
            Error::Lock(_) => ErrorKind::Io,
            Error::Journal(JournalError::NotFound(_)) => ErrorKind::NotFound,
            Error::Journal(JournalError::Json(_)) => ErrorKind::Corrupt,
            Error::Journal(_) => ErrorKind::Io,
            Error::Config(_) => ErrorKind::Config,
            Error::Path { .. } | Error::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn not_found(what: &'static str, name: impl ToString) -> Self {
        Error::NotFound {
            what,
            name: name.to_string(),
        }
    }

    pub(crate) fn corrupt(what: impl ToString, message: impl Into<String>) -> Self {
        Error::Corrupt {
            what: what.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn at_path(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Error::Path { path, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_every_category() {
        assert_eq!(Error::not_found("object", "abc").kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::CasFailed {
                refname: "refs/heads/main".into(),
                expected: "a".into(),
                actual: "b".into(),
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(Error::corrupt("tree", "bad").kind(), ErrorKind::Corrupt);
        assert_eq!(
            Error::Type(TypeError::InvalidRefName("x".into())).kind(),
            ErrorKind::InvalidSpec
        );
        assert_eq!(Error::Lock(LockError::AlreadyLocked).kind(), ErrorKind::Locked);
    }

    #[test]
    fn messages_name_the_subject() {
        let err = Error::not_found("reference", "refs/heads/gone");
        assert_eq!(err.to_string(), "reference not found: refs/heads/gone");
    }
}
