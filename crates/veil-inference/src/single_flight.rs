//! Keyed request coalescing.
//!
//! The first caller for a key starts the computation; concurrent and later
//! callers await the same shared future and receive a clone of its result.
//! Successful results stay cached. Failed computations are evicted so the
//! next call retries.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::errors::{InferenceError, Result};

type SharedResult<V> = Shared<BoxFuture<'static, std::result::Result<V, Arc<InferenceError>>>>;

/// Map from key to in-flight or completed computation.
pub struct SingleFlight<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, SharedResult<V>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Return the result for `key`, starting `compute` only if no computation
    /// for the key exists.
    pub async fn run<F, Fut>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let shared = match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let fut = compute().map(|r| r.map_err(Arc::new)).boxed().shared();
                let _ = entry.insert(fut.clone());
                fut
            }
        };

        match shared.clone().await {
            Ok(value) => Ok(value),
            Err(err) => {
                let _ = self
                    .entries
                    .remove_if(&key, |_, existing| existing.ptr_eq(&shared));
                Err(InferenceError::Shared(err))
            }
        }
    }

    /// Whether a computation for `key` is cached or in flight.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of cached or in-flight keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached result.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
