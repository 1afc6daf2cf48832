//! odb::backend
//!
//! Storage backend trait.
//!
//! Backends only move bytes keyed by id. Hashing, caching and typed
//! decoding live in [`Odb`](super::Odb), so a backend never has to know
//! which digest produced the keys it stores.

use std::fmt;

use crate::core::types::{ObjectType, Oid};
use crate::error::Result;

/// Durable (or in-process) storage of framed objects.
///
/// # Contract
///
/// - `put` is idempotent: storing an id that is already present is a
///   successful no-op and returns `false`.
/// - Existing keys are never rewritten in place.
/// - `get` verifies integrity and reports damaged data as `Corrupt`.
/// - Implementations must be safe to share between threads; readers must
///   not block each other.
pub trait ObjectBackend: Send + Sync + fmt::Debug {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Store `payload` under `oid`. Returns whether anything was written.
    fn put(&self, oid: &Oid, kind: ObjectType, payload: &[u8]) -> Result<bool>;

    /// Load an object, `None` when absent.
    fn get(&self, oid: &Oid) -> Result<Option<(ObjectType, Vec<u8>)>>;

    /// Type and size without the payload, `None` when absent.
    fn header(&self, oid: &Oid) -> Result<Option<(ObjectType, usize)>> {
        Ok(self
            .get(oid)?
            .map(|(kind, payload)| (kind, payload.len())))
    }

    fn contains(&self, oid: &Oid) -> Result<bool>;

    /// Ids whose hex form starts with `prefix` (lowercase, at least 2 chars).
    fn ids_with_prefix(&self, prefix: &str) -> Result<Vec<Oid>>;

    /// Every stored id, sorted.
    fn ids(&self) -> Result<Vec<Oid>>;
}
