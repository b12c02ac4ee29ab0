//! In-memory store backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use veil_core::StoreName;

use crate::errors::{Result, StoreError};
use crate::kv::KeyValueStore;

/// Process-lifetime store, used by tests and by hosts without durable storage.
#[derive(Default)]
pub struct MemoryStore {
    stores: RwLock<HashMap<StoreName, BTreeMap<String, Value>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject all further operations with [`StoreError::NotInitialized`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::NotInitialized("memory store closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, store: StoreName, key: &str) -> Result<Option<Value>> {
        self.ensure_open()?;
        Ok(self
            .stores
            .read()
            .get(&store)
            .and_then(|s| s.get(key).cloned()))
    }

    async fn set(&self, store: StoreName, key: &str, value: Value) -> Result<()> {
        self.ensure_open()?;
        let _ = self
            .stores
            .write()
            .entry(store)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, store: StoreName, key: &str) -> Result<()> {
        self.ensure_open()?;
        if let Some(s) = self.stores.write().get_mut(&store) {
            let _ = s.remove(key);
        }
        Ok(())
    }

    async fn get_all(&self, store: StoreName) -> Result<BTreeMap<String, Value>> {
        self.ensure_open()?;
        Ok(self.stores.read().get(&store).cloned().unwrap_or_default())
    }
}
