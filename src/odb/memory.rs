//! odb::memory
//!
//! In-process backend for tests and in-memory repositories.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::backend::ObjectBackend;
use crate::core::types::{ObjectType, Oid};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<Oid, (ObjectType, Arc<[u8]>)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl ObjectBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn put(&self, oid: &Oid, kind: ObjectType, payload: &[u8]) -> Result<bool> {
        let mut objects = self.objects.write();
        if objects.contains_key(oid) {
            return Ok(false);
        }
        objects.insert(*oid, (kind, Arc::from(payload)));
        Ok(true)
    }

    fn get(&self, oid: &Oid) -> Result<Option<(ObjectType, Vec<u8>)>> {
        Ok(self
            .objects
            .read()
            .get(oid)
            .map(|(kind, payload)| (*kind, payload.to_vec())))
    }

    fn header(&self, oid: &Oid) -> Result<Option<(ObjectType, usize)>> {
        Ok(self
            .objects
            .read()
            .get(oid)
            .map(|(kind, payload)| (*kind, payload.len())))
    }

    fn contains(&self, oid: &Oid) -> Result<bool> {
        Ok(self.objects.read().contains_key(oid))
    }

    fn ids_with_prefix(&self, prefix: &str) -> Result<Vec<Oid>> {
        Ok(self
            .objects
            .read()
            .keys()
            .filter(|oid| oid.matches_prefix(prefix))
            .copied()
            .collect())
    }

    fn ids(&self) -> Result<Vec<Oid>> {
        Ok(self.objects.read().keys().copied().collect())
    }
}
