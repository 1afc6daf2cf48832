//! core::ops::lock
//!
//! Exclusive file locks guarding mutable repository state.
//!
//! # Architecture
//!
//! Objects are immutable and need no locking. The two mutable stores,
//! references and the index, serialize their read-compare-write cycles
//! through a [`FileLock`] on a dedicated lock file:
//!
//! - `<repo>/refs.lock` - held for the duration of one ref transaction
//! - `<repo>/index.lock` - held while the index file is replaced
//!
//! Locks are OS-level advisory locks via `fs2`, so they exclude other
//! processes as well as other threads holding their own handle.
//!
//! # Invariants
//!
//! - Lock is automatically released on drop (RAII pattern)
//! - [`FileLock::acquire`] blocks until the lock is free
//! - [`FileLock::try_acquire`] fails fast with [`LockError::AlreadyLocked`]
//!
//! # Example
//!
//! ```no_run
//! use grove::core::ops::lock::FileLock;
//! use std::path::Path;
//!
//! let lock = FileLock::acquire(Path::new("/work/.grove/refs.lock"))?;
//! // read, compare, write
//! drop(lock);
//! # Ok::<(), grove::core::ops::lock::LockError>(())
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another holder already has the lock.
    #[error("repository is locked by another process")]
    AlreadyLocked,

    /// Failed to create lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// An exclusive lock on one lock file.
///
/// The lock is released when this guard is dropped, even if the holder
/// panics.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    /// When this is Some, we hold the lock.
    file: Option<File>,
}

impl FileLock {
    /// Acquire the lock, waiting for any current holder to release it.
    ///
    /// # Errors
    ///
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be acquired
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let file = Self::open(path)?;
        file.lock_exclusive()
            .map_err(|e| LockError::AcquireFailed(e.to_string()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    /// Attempt to acquire the lock without waiting.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if someone else holds the lock
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    pub fn try_acquire(path: &Path) -> Result<Self, LockError> {
        let file = Self::open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path: path.to_path_buf(),
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::AlreadyLocked),
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    fn open(path: &Path) -> Result<File, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LockError::CreateFailed(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e)))
    }

    /// Check if the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock before the guard goes out of scope.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            file.unlock()
                .map_err(|e| LockError::ReleaseFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
