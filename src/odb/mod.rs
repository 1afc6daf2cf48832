//! odb
//!
//! Content-addressable object database.
//!
//! # Architecture
//!
//! [`Odb`] is the explicit context handle of the engine. It owns:
//! - the [`HashAlgorithm`] every id is derived with,
//! - a storage backend ([`MemoryBackend`] or [`LooseBackend`]),
//! - a bounded cache of decoded objects,
//! - write/read counters ([`OdbStats`]).
//!
//! There is no process-wide state; dropping the `Odb` releases everything.
//! `Odb` is `Send + Sync`: reads of immutable objects need no mutual
//! exclusion, and concurrent writes of the same content are idempotent.
//!
//! # Example
//!
//! ```
//! use grove::core::types::{HashAlgorithm, ObjectType};
//! use grove::odb::Odb;
//!
//! let odb = Odb::in_memory(HashAlgorithm::Sha1);
//! let id = odb.write(ObjectType::Blob, b"hello\n")?;
//! assert_eq!(id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
//! let raw = odb.read(&id)?;
//! assert_eq!(&*raw.data, b"hello\n");
//! assert_eq!(odb.resolve_prefix("ce0136")?, id);
//! # Ok::<(), grove::Error>(())
//! ```

pub mod backend;
mod cache;
pub mod encoding;
pub mod loose;
pub mod memory;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

pub use backend::ObjectBackend;
pub use loose::LooseBackend;
pub use memory::MemoryBackend;

use self::cache::ObjectCache;
use crate::core::config::Config;
use crate::core::types::{HashAlgorithm, ObjectType, Oid};
use crate::error::{Error, Result};
use crate::object::{Blob, Commit, Object, Tag, Tree};

/// Shortest abbreviated id accepted by prefix lookups.
pub const MIN_PREFIX_LEN: usize = 4;

/// A stored object: its type and payload (without framing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub kind: ObjectType,
    pub data: Arc<[u8]>,
}

impl RawObject {
    pub fn new(kind: ObjectType, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OdbStats {
    /// Objects newly written to the backend.
    pub writes: u64,
    /// Writes that found the object already present.
    pub duplicate_writes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Debug, Default)]
struct Counters {
    writes: AtomicU64,
    duplicate_writes: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

/// The object database context.
#[derive(Debug)]
pub struct Odb {
    algorithm: HashAlgorithm,
    backend: Box<dyn ObjectBackend>,
    cache: ObjectCache,
    counters: Counters,
}

impl Odb {
    pub fn new(
        algorithm: HashAlgorithm,
        backend: Box<dyn ObjectBackend>,
        cache_objects: usize,
    ) -> Self {
        Self {
            algorithm,
            backend,
            cache: ObjectCache::new(cache_objects),
            counters: Counters::default(),
        }
    }

    pub fn in_memory(algorithm: HashAlgorithm) -> Self {
        Self::new(
            algorithm,
            Box::new(MemoryBackend::new()),
            Config::DEFAULT_CACHE_OBJECTS,
        )
    }

    /// Loose-object database over `objects_dir`, configured from `config`.
    pub fn loose(objects_dir: impl Into<PathBuf>, algorithm: HashAlgorithm, config: &Config) -> Self {
        Self::new(
            algorithm,
            Box::new(LooseBackend::new(objects_dir, algorithm, config.compression())),
            config.cache_objects(),
        )
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Id `payload` would get, without storing it.
    pub fn hash(&self, kind: ObjectType, payload: &[u8]) -> Oid {
        encoding::hash(self.algorithm, kind, payload)
    }

    /// Store an object. Writing content that is already present is a
    /// successful no-op returning the same id.
    pub fn write(&self, kind: ObjectType, payload: &[u8]) -> Result<Oid> {
        let oid = self.hash(kind, payload);
        if self.backend.put(&oid, kind, payload)? {
            self.counters.writes.fetch_add(1, Ordering::Relaxed);
            debug!(%oid, %kind, size = payload.len(), backend = self.backend.name(), "stored object");
        } else {
            self.counters.duplicate_writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(oid)
    }

    /// Load an object, failing with `NotFound` when absent.
    pub fn read(&self, oid: &Oid) -> Result<RawObject> {
        if let Some(hit) = self.cache.get(oid) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        let (kind, payload) = self
            .backend
            .get(oid)?
            .ok_or_else(|| Error::not_found("object", oid))?;
        let raw = RawObject::new(kind, payload);
        self.cache.insert(*oid, raw.clone());
        Ok(raw)
    }

    /// Type and payload size without decoding the payload.
    pub fn read_header(&self, oid: &Oid) -> Result<(ObjectType, usize)> {
        if let Some(hit) = self.cache.get(oid) {
            return Ok((hit.kind, hit.size()));
        }
        self.backend
            .header(oid)?
            .ok_or_else(|| Error::not_found("object", oid))
    }

    pub fn exists(&self, oid: &Oid) -> Result<bool> {
        self.backend.contains(oid)
    }

    /// Resolve an abbreviated hex id to the single object it names.
    ///
    /// # Errors
    ///
    /// - `InvalidSpec` for fewer than [`MIN_PREFIX_LEN`] or non-hex characters
    /// - `Ambiguous` when more than one object matches
    /// - `NotFound` when none does
    pub fn resolve_prefix(&self, prefix: &str) -> Result<Oid> {
        let prefix = prefix.to_ascii_lowercase();
        if prefix.len() < MIN_PREFIX_LEN
            || prefix.len() > self.algorithm.hex_len()
            || !prefix.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(Error::InvalidSpec(format!(
                "'{prefix}' is not an abbreviated object id"
            )));
        }
        if prefix.len() == self.algorithm.hex_len() {
            let oid = Oid::from_hex(&prefix)?;
            return if self.exists(&oid)? {
                Ok(oid)
            } else {
                Err(Error::not_found("object", oid))
            };
        }
        let mut matches = self.backend.ids_with_prefix(&prefix)?;
        match matches.len() {
            0 => Err(Error::not_found("object", prefix)),
            1 => Ok(matches.remove(0)),
            n => Err(Error::Ambiguous {
                what: "object id",
                name: prefix,
                candidates: n,
            }),
        }
    }

    /// [`resolve_prefix`](Self::resolve_prefix) followed by [`read`](Self::read).
    pub fn read_prefix(&self, prefix: &str) -> Result<(Oid, RawObject)> {
        let oid = self.resolve_prefix(prefix)?;
        let raw = self.read(&oid)?;
        Ok((oid, raw))
    }

    /// Shortest prefix of `oid`, at least `min_len` long, that names no other object.
    pub fn shortest_unique_prefix(&self, oid: &Oid, min_len: usize) -> Result<String> {
        let hex = oid.to_hex();
        let start = min_len.clamp(MIN_PREFIX_LEN, hex.len());
        let mut others: Vec<String> = self
            .backend
            .ids_with_prefix(&hex[..start])?
            .into_iter()
            .filter(|other| other != oid)
            .map(|other| other.to_hex())
            .collect();
        let mut len = start;
        while len < hex.len() {
            others.retain(|other| other[..len] == hex[..len]);
            if others.is_empty() {
                break;
            }
            len += 1;
        }
        Ok(hex[..len].to_string())
    }

    /// Every stored id, sorted.
    pub fn ids(&self) -> Result<Vec<Oid>> {
        self.backend.ids()
    }

    /// Lazy iteration over stored ids (sorted).
    pub fn iter(&self) -> Result<impl Iterator<Item = Oid>> {
        Ok(self.ids()?.into_iter())
    }

    pub fn stats(&self) -> OdbStats {
        OdbStats {
            writes: self.counters.writes.load(Ordering::Relaxed),
            duplicate_writes: self.counters.duplicate_writes.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Number of decoded objects currently cached.
    pub fn cached_objects(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    // Typed access

    pub fn find_object(&self, oid: &Oid) -> Result<Object> {
        let raw = self.read(oid)?;
        Object::parse(self.algorithm, raw.kind, &raw.data)
    }

    fn read_kind(&self, oid: &Oid, expected: ObjectType) -> Result<RawObject> {
        let raw = self.read(oid)?;
        if raw.kind != expected {
            return Err(Error::InvalidTarget {
                oid: *oid,
                expected,
                actual: raw.kind,
            });
        }
        Ok(raw)
    }

    pub fn find_blob(&self, oid: &Oid) -> Result<Blob> {
        let raw = self.read_kind(oid, ObjectType::Blob)?;
        Ok(Blob::new(raw.data.to_vec()))
    }

    pub fn find_tree(&self, oid: &Oid) -> Result<Tree> {
        let raw = self.read_kind(oid, ObjectType::Tree)?;
        Tree::parse(self.algorithm, &raw.data)
    }

    pub fn find_commit(&self, oid: &Oid) -> Result<Commit> {
        let raw = self.read_kind(oid, ObjectType::Commit)?;
        Commit::parse(&raw.data)
    }

    pub fn find_tag(&self, oid: &Oid) -> Result<Tag> {
        let raw = self.read_kind(oid, ObjectType::Tag)?;
        Tag::parse(&raw.data)
    }

    pub fn write_blob(&self, data: &[u8]) -> Result<Oid> {
        self.write(ObjectType::Blob, data)
    }

    /// Store a tree as given. Use [`TreeBuilder`](crate::object::TreeBuilder)
    /// to validate entries first.
    pub fn write_tree(&self, tree: &Tree) -> Result<Oid> {
        self.write(ObjectType::Tree, &tree.encode())
    }

    pub fn write_commit(&self, commit: &Commit) -> Result<Oid> {
        self.write(ObjectType::Commit, &commit.encode())
    }

    pub fn write_tag(&self, tag: &Tag) -> Result<Oid> {
        self.write(ObjectType::Tag, &tag.encode())
    }

    pub fn write_object(&self, object: &Object) -> Result<Oid> {
        self.write(object.kind(), &object.encode())
    }

    /// Follow tags (and commit → tree) until an object of type `target`.
    ///
    /// Fails with `InvalidTarget` when the chain ends elsewhere.
    pub fn peel(&self, oid: &Oid, target: ObjectType) -> Result<Oid> {
        let mut current = *oid;
        // Tag chains are short; the bound only stops pathological loops.
        for _ in 0..64 {
            let (kind, _) = self.read_header(&current)?;
            if kind == target {
                return Ok(current);
            }
            match (kind, target) {
                (ObjectType::Tag, _) => current = self.find_tag(&current)?.target,
                (ObjectType::Commit, ObjectType::Tree) => {
                    current = self.find_commit(&current)?.tree
                }
                (actual, expected) => {
                    return Err(Error::InvalidTarget {
                        oid: *oid,
                        expected,
                        actual,
                    })
                }
            }
        }
        Err(Error::corrupt(format!("tag {oid}"), "tag chain too long"))
    }

    /// Peel any tags and return the commit underneath.
    pub fn peel_to_commit(&self, oid: &Oid) -> Result<Oid> {
        self.peel(oid, ObjectType::Commit)
    }

    /// Tree of a commit, or the tree itself.
    pub fn peel_to_tree(&self, oid: &Oid) -> Result<Oid> {
        self.peel(oid, ObjectType::Tree)
    }
}
