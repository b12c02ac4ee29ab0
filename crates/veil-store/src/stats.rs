//! Persisted per-word hit counters.

use std::collections::BTreeMap;

use serde_json::Value;
use veil_core::StoreName;

use crate::errors::{Result, decode};
use crate::gateway::StoreGateway;

const STORE: StoreName = StoreName::WordStats;

/// Read-only statistics for editors, additive updates for the aggregator.
#[derive(Clone)]
pub struct WordStatsRepository {
    gateway: StoreGateway,
}

impl WordStatsRepository {
    /// Create a repository over the gateway.
    pub fn new(gateway: StoreGateway) -> Self {
        Self { gateway }
    }

    /// All counters, sorted by word.
    pub async fn word_stats(&self) -> Result<BTreeMap<String, i64>> {
        self.gateway
            .get_all(STORE)
            .await?
            .into_iter()
            .map(|(word, value)| {
                let count = decode(STORE, &word, value)?;
                Ok((word, count))
            })
            .collect()
    }

    /// Counter for one word (zero when absent).
    pub async fn count(&self, word: &str) -> Result<i64> {
        match self.gateway.get(STORE, word).await? {
            Some(value) => decode(STORE, word, value),
            None => Ok(0),
        }
    }

    /// Add `delta` to one word's counter. Returns the new count.
    pub async fn add(&self, word: &str, delta: i64) -> Result<i64> {
        let updated = self.count(word).await? + delta;
        self.gateway.set(STORE, word, Value::from(updated)).await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deltas_are_additive() {
        let repo = WordStatsRepository::new(StoreGateway::in_memory());
        assert_eq!(repo.add("meth", 2).await.unwrap(), 2);
        assert_eq!(repo.add("meth", -1).await.unwrap(), 1);
        let _ = repo.add("crack", 5).await.unwrap();

        let stats = repo.word_stats().await.unwrap();
        assert_eq!(stats.get("meth"), Some(&1));
        assert_eq!(stats.get("crack"), Some(&5));
        assert_eq!(repo.count("absent").await.unwrap(), 0);
    }
}
