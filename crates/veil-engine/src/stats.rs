//! Per-word hit deltas, flushed to persisted counters.

use std::collections::HashMap;
use std::mem;

use parking_lot::Mutex;
use tracing::{debug, warn};
use veil_store::{StoreGateway, WordStatsRepository};

use crate::errors::Result;
use crate::state::FilterCause;

/// Accumulates signed per-word deltas between flushes.
pub struct StatsAggregator {
    deltas: Mutex<HashMap<String, i64>>,
    repo: WordStatsRepository,
}

impl StatsAggregator {
    /// Create an aggregator writing through `gateway`.
    pub fn new(gateway: &StoreGateway) -> Self {
        Self {
            deltas: Mutex::new(HashMap::new()),
            repo: WordStatsRepository::new(gateway.clone()),
        }
    }

    /// Count a filter being applied. Semantic causes are not counted.
    pub fn record_applied(&self, cause: &FilterCause) {
        self.bump(cause, 1);
    }

    /// Count a filter being removed.
    pub fn record_removed(&self, cause: &FilterCause) {
        self.bump(cause, -1);
    }

    /// Delta not yet flushed for a word.
    pub fn pending(&self, word: &str) -> i64 {
        self.deltas.lock().get(word).copied().unwrap_or(0)
    }

    /// Drain every delta into the store.
    ///
    /// Deltas recorded while the flush runs go to the fresh map. On a write
    /// failure the unwritten deltas are merged back and retried next flush.
    pub async fn flush(&self) -> Result<usize> {
        let drained = mem::take(&mut *self.deltas.lock());
        let mut pending: Vec<(String, i64)> =
            drained.into_iter().filter(|(_, delta)| *delta != 0).collect();
        let total = pending.len();

        while let Some((word, delta)) = pending.pop() {
            if let Err(e) = self.repo.add(&word, delta).await {
                pending.push((word, delta));
                let mut deltas = self.deltas.lock();
                for (word, delta) in pending {
                    *deltas.entry(word).or_insert(0) += delta;
                }
                warn!(error = %e, "word stats flush failed");
                return Err(e.into());
            }
        }
        if total > 0 {
            debug!(words = total, "word stats flushed");
        }
        Ok(total)
    }

    fn bump(&self, cause: &FilterCause, delta: i64) {
        if let Some(word) = cause.word() {
            *self.deltas.lock().entry(word.to_string()).or_insert(0) += delta;
        }
    }
}
