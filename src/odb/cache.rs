//! odb::cache
//!
//! Bounded least-recently-used cache of decoded objects.
//!
//! Lookups only take the read lock; recency is tracked with an atomic
//! tick per entry, so concurrent readers never serialize. Eviction scans
//! for the oldest tick, which is fine for caches of a few thousand entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::RawObject;
use crate::core::types::Oid;

#[derive(Debug)]
struct Slot {
    object: RawObject,
    last_used: AtomicU64,
}

#[derive(Debug)]
pub(crate) struct ObjectCache {
    capacity: usize,
    clock: AtomicU64,
    slots: RwLock<HashMap<Oid, Slot>>,
}

impl ObjectCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            clock: AtomicU64::new(0),
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn get(&self, oid: &Oid) -> Option<RawObject> {
        let slots = self.slots.read();
        let slot = slots.get(oid)?;
        slot.last_used.store(self.tick(), Ordering::Relaxed);
        Some(slot.object.clone())
    }

    pub(crate) fn insert(&self, oid: Oid, object: RawObject) {
        if self.capacity == 0 {
            return;
        }
        let mut slots = self.slots.write();
        if !slots.contains_key(&oid) && slots.len() >= self.capacity {
            let oldest = slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used.load(Ordering::Relaxed))
                .map(|(oid, _)| *oid);
            if let Some(oldest) = oldest {
                slots.remove(&oldest);
            }
        }
        slots.insert(
            oid,
            Slot {
                object,
                last_used: AtomicU64::new(self.tick()),
            },
        );
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub(crate) fn clear(&self) {
        self.slots.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{HashAlgorithm, ObjectType};

    fn raw(text: &str) -> (Oid, RawObject) {
        let oid = HashAlgorithm::Sha1.digest(&[text.as_bytes()]);
        (oid, RawObject::new(ObjectType::Blob, text.as_bytes().to_vec()))
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = ObjectCache::new(2);
        let (a, ra) = raw("a");
        let (b, rb) = raw("b");
        let (c, rc) = raw("c");
        cache.insert(a, ra);
        cache.insert(b, rb);
        assert!(cache.get(&a).is_some());
        cache.insert(c, rc);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
        assert!(cache.get(&c).is_some());
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = ObjectCache::new(0);
        let (a, ra) = raw("a");
        cache.insert(a, ra);
        assert!(cache.get(&a).is_none());
        cache.clear();
    }
}
