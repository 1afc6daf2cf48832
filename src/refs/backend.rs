//! refs::backend
//!
//! Storage of reference values and reflogs.
//!
//! Backends store and load raw values only. Compare-and-swap, symbolic
//! resolution and reflog bookkeeping happen in
//! [`RefStore`](super::RefStore) while it holds the transaction lock.

use std::fmt;

use super::{RefTarget, ReflogEntry};
use crate::core::types::RefName;
use crate::error::Result;

pub trait RefBackend: Send + Sync + fmt::Debug {
    fn read(&self, name: &RefName) -> Result<Option<RefTarget>>;

    fn write(&self, name: &RefName, target: &RefTarget) -> Result<()>;

    /// Remove a reference; returns whether it existed.
    fn remove(&self, name: &RefName) -> Result<bool>;

    /// Names of all references under `refs/`, sorted.
    fn names(&self) -> Result<Vec<RefName>>;

    fn append_log(&self, name: &RefName, entry: &ReflogEntry) -> Result<()>;

    /// Reflog entries in the order they were appended.
    fn read_log(&self, name: &RefName) -> Result<Vec<ReflogEntry>>;

    fn remove_log(&self, name: &RefName) -> Result<()>;
}
