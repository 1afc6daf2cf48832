//! refs::memory

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use super::backend::RefBackend;
use super::{RefTarget, ReflogEntry};
use crate::core::types::RefName;
use crate::error::Result;

/// Reference storage held in process memory.
#[derive(Debug, Default)]
pub struct MemoryRefBackend {
    refs: RwLock<BTreeMap<RefName, RefTarget>>,
    logs: RwLock<HashMap<RefName, Vec<ReflogEntry>>>,
}

impl MemoryRefBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefBackend for MemoryRefBackend {
    fn read(&self, name: &RefName) -> Result<Option<RefTarget>> {
        Ok(self.refs.read().get(name).cloned())
    }

    fn write(&self, name: &RefName, target: &RefTarget) -> Result<()> {
        self.refs.write().insert(name.clone(), target.clone());
        Ok(())
    }

    fn remove(&self, name: &RefName) -> Result<bool> {
        Ok(self.refs.write().remove(name).is_some())
    }

    fn names(&self) -> Result<Vec<RefName>> {
        Ok(self
            .refs
            .read()
            .keys()
            .filter(|name| name.as_str().starts_with("refs/"))
            .cloned()
            .collect())
    }

    fn append_log(&self, name: &RefName, entry: &ReflogEntry) -> Result<()> {
        self.logs
            .write()
            .entry(name.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    fn read_log(&self, name: &RefName) -> Result<Vec<ReflogEntry>> {
        Ok(self.logs.read().get(name).cloned().unwrap_or_default())
    }

    fn remove_log(&self, name: &RefName) -> Result<()> {
        self.logs.write().remove(name);
        Ok(())
    }
}
