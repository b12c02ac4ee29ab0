//! Embedding request coalescer.
//!
//! Texts queue until either `max_batch_size` are waiting or `window` has
//! passed since the first one arrived, then go upstream as one request.
//! Each caller receives its own vector through a oneshot channel.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::budget::BudgetGuard;
use crate::errors::{InferenceError, Result};
use crate::provider::EmbeddingProvider;

type Reply = std::result::Result<Vec<f32>, Arc<InferenceError>>;

struct Waiter {
    text: String,
    reply: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct Pending {
    waiters: Vec<Waiter>,
    /// Bumped on every flush so a stale window timer can tell its batch is gone.
    epoch: u64,
}

struct Inner {
    provider: Arc<dyn EmbeddingProvider>,
    budget: Option<BudgetGuard>,
    max_batch_size: usize,
    window: Duration,
    pending: Mutex<Pending>,
}

/// Groups concurrent embedding requests into batched upstream calls.
#[derive(Clone)]
pub struct EmbeddingBatcher {
    inner: Arc<Inner>,
}

impl EmbeddingBatcher {
    /// Create a batcher. Spend is recorded on `budget` when given.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        budget: Option<BudgetGuard>,
        max_batch_size: usize,
        window: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                budget,
                max_batch_size: max_batch_size.max(1),
                window,
                pending: Mutex::new(Pending::default()),
            }),
        }
    }

    /// Queue one text and wait for its vector.
    pub async fn embed(&self, text: String) -> Result<Vec<f32>> {
        let (reply, receiver) = oneshot::channel();
        let full_batch = {
            let mut pending = self.inner.pending.lock();
            pending.waiters.push(Waiter { text, reply });
            if pending.waiters.len() >= self.inner.max_batch_size {
                pending.epoch += 1;
                Some(std::mem::take(&mut pending.waiters))
            } else {
                if pending.waiters.len() == 1 {
                    self.start_window(pending.epoch);
                }
                None
            }
        };

        if let Some(batch) = full_batch {
            let inner = Arc::clone(&self.inner);
            let _ = tokio::spawn(async move { inner.flush(batch).await });
        }

        match receiver.await {
            Ok(reply) => reply.map_err(InferenceError::Shared),
            Err(_) => Err(InferenceError::InvalidResponse(
                "embedding batch was dropped".into(),
            )),
        }
    }

    fn start_window(&self, epoch: u64) {
        let inner = Arc::clone(&self.inner);
        let _ = tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;
            let batch = {
                let mut pending = inner.pending.lock();
                if pending.epoch != epoch || pending.waiters.is_empty() {
                    return;
                }
                pending.epoch += 1;
                std::mem::take(&mut pending.waiters)
            };
            inner.flush(batch).await;
        });
    }
}

impl Inner {
    async fn flush(&self, batch: Vec<Waiter>) {
        let texts: Vec<String> = batch.iter().map(|w| w.text.clone()).collect();
        debug!(count = texts.len(), "flushing embedding batch");

        match self.fetch(&texts).await {
            Ok(vectors) => {
                for (waiter, vector) in batch.into_iter().zip(vectors) {
                    let _ = waiter.reply.send(Ok(vector));
                }
            }
            Err(err) => {
                warn!(error = %err, count = texts.len(), "embedding batch failed");
                let err = Arc::new(err);
                for waiter in batch {
                    let _ = waiter.reply.send(Err(Arc::clone(&err)));
                }
            }
        }
    }

    async fn fetch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let result = self.provider.embed(texts).await?;
        if result.vectors.len() != texts.len() {
            return Err(InferenceError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                result.vectors.len()
            )));
        }
        if self.provider.is_billed()
            && let Some(budget) = &self.budget
        {
            let _ = budget.record(self.provider.model(), result.usage).await?;
        }
        Ok(result.vectors)
    }
}
