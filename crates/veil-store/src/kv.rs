//! The key-value store contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use veil_core::StoreName;

use crate::errors::Result;

/// Async key-value persistence over a fixed set of named stores.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read one key; absent keys are `Ok(None)`.
    async fn get(&self, store: StoreName, key: &str) -> Result<Option<Value>>;

    /// Write one key (last write wins).
    async fn set(&self, store: StoreName, key: &str, value: Value) -> Result<()>;

    /// Delete one key. Deleting an absent key is not an error.
    async fn delete(&self, store: StoreName, key: &str) -> Result<()>;

    /// Read every key of a store, ordered by key.
    async fn get_all(&self, store: StoreName) -> Result<BTreeMap<String, Value>>;
}
