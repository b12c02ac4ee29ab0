//! The persistence gateway.
//!
//! All reads and writes go through [`StoreGateway`], which forwards to the
//! backing [`KeyValueStore`] and broadcasts `dataChanged` after every
//! successful mutation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use veil_core::{StoreName, StoreNotification, StoreRequest, StoreResponse};

use crate::bus::ChangeBus;
use crate::errors::Result;
use crate::kv::KeyValueStore;
use crate::memory::MemoryStore;

/// Single entry point to persisted state.
#[derive(Clone)]
pub struct StoreGateway {
    store: Arc<dyn KeyValueStore>,
    bus: ChangeBus,
}

impl StoreGateway {
    /// Wrap a backend with a fresh change bus.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            bus: ChangeBus::default(),
        }
    }

    /// Wrap a backend, publishing on an existing bus.
    pub fn with_bus(store: Arc<dyn KeyValueStore>, bus: ChangeBus) -> Self {
        Self { store, bus }
    }

    /// Gateway over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreNotification> {
        self.bus.subscribe()
    }

    /// The bus notifications are published on.
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Handle one request message.
    pub async fn dispatch(&self, request: StoreRequest) -> Result<StoreResponse> {
        match request {
            StoreRequest::Get { store, key } => Ok(StoreResponse::Value(self.get(store, &key).await?)),
            StoreRequest::Set { store, key, value } => {
                self.set(store, &key, value).await?;
                Ok(StoreResponse::Ack)
            }
            StoreRequest::Delete { store, key } => {
                self.delete(store, &key).await?;
                Ok(StoreResponse::Ack)
            }
            StoreRequest::GetAll { store } => Ok(StoreResponse::All(self.get_all(store).await?)),
        }
    }

    /// Read one key.
    pub async fn get(&self, store: StoreName, key: &str) -> Result<Option<Value>> {
        self.store.get(store, key).await
    }

    /// Read every key of a store.
    pub async fn get_all(&self, store: StoreName) -> Result<BTreeMap<String, Value>> {
        self.store.get_all(store).await
    }

    /// Write one key and announce the change.
    pub async fn set(&self, store: StoreName, key: &str, value: Value) -> Result<()> {
        self.store.set(store, key, value.clone()).await?;
        debug!(%store, key, "data changed");
        self.bus.publish(StoreNotification::DataChanged {
            store,
            key: key.to_string(),
            value: Some(value),
        });
        Ok(())
    }

    /// Delete one key and announce the change.
    pub async fn delete(&self, store: StoreName, key: &str) -> Result<()> {
        self.store.delete(store, key).await?;
        debug!(%store, key, "data deleted");
        self.bus.publish(StoreNotification::DataChanged {
            store,
            key: key.to_string(),
            value: None,
        });
        Ok(())
    }
}
