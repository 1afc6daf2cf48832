//! core::cancel
//!
//! Cooperative cancellation.
//!
//! Long computations (full-history walks, diffs with rename detection,
//! tree merges) poll a [`CancelToken`] at iteration boundaries and stop
//! with [`Error::Interrupted`](crate::Error::Interrupted) once it is
//! raised. Nothing is preempted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(Interrupted)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Poll an optional token.
pub(crate) fn check(token: Option<&CancelToken>) -> Result<()> {
    token.map_or(Ok(()), CancelToken::check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());
        other.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check().unwrap_err().kind(), ErrorKind::Interrupted);
        assert!(check(None).is_ok());
    }
}
