//! Deterministic providers for tests.
//!
//! [`MockEmbeddingProvider`] hashes text into a unit vector unless a vector
//! was pinned for that text. [`MockCompletionProvider`] answers through a
//! caller-supplied closure. Both record every call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::errors::{InferenceError, Result};
use crate::provider::{Completion, CompletionProvider, EmbeddingBatch, EmbeddingProvider, Usage};
use crate::vector::l2_norm;

// ─────────────────────────────────────────────────────────────────────────────
// Embeddings
// ─────────────────────────────────────────────────────────────────────────────

/// Mock embedding provider.
pub struct MockEmbeddingProvider {
    dims: usize,
    pinned: Mutex<HashMap<String, Vec<f32>>>,
    batches: Mutex<Vec<Vec<String>>>,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl MockEmbeddingProvider {
    /// Provider producing `dims`-dimensional vectors.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            pinned: Mutex::new(HashMap::new()),
            batches: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            delay: None,
        }
    }

    /// Sleep this long inside every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Return `vector` whenever `text` is embedded.
    pub fn pin(&self, text: &str, vector: Vec<f32>) {
        let _ = self.pinned.lock().insert(text.to_string(), vector);
    }

    /// Make subsequent calls fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every batch received, in call order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().clone()
    }

    /// Number of upstream calls.
    pub fn call_count(&self) -> usize {
        self.batches.lock().len()
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.pinned.lock().get(text) {
            return v.clone();
        }
        let hash = Sha256::digest(text.as_bytes());
        let mut v: Vec<f32> = (0..self.dims)
            .map(|i| (f32::from(hash[i % hash.len()]) / 127.5) - 1.0)
            .collect();
        let norm = l2_norm(&v);
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        self.batches.lock().push(texts.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(InferenceError::Api {
                status: 503,
                message: "mock embeddings unavailable".into(),
            });
        }
        let tokens: usize = texts.iter().map(|t| t.split_whitespace().count()).sum();
        Ok(EmbeddingBatch {
            vectors: texts.iter().map(|t| self.vector_for(t)).collect(),
            usage: Usage {
                input_tokens: tokens as u64,
                output_tokens: 0,
            },
        })
    }

    fn model(&self) -> &str {
        "text-embedding-3-small"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Completions
// ─────────────────────────────────────────────────────────────────────────────

type Responder = Box<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Mock completion provider.
pub struct MockCompletionProvider {
    responder: Responder,
    calls: Mutex<Vec<(String, String)>>,
    billed: bool,
    usage: Usage,
}

impl MockCompletionProvider {
    /// Answer every call through `responder(system, user)`.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
            billed: true,
            usage: Usage {
                input_tokens: 200,
                output_tokens: 20,
            },
        }
    }

    /// Answer every call with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_, _| text.clone())
    }

    /// Report calls as free (local model).
    #[must_use]
    pub fn unbilled(mut self) -> Self {
        self.billed = false;
        self
    }

    /// Usage reported for each call.
    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// User messages received, in call order.
    pub fn user_messages(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, u)| u.clone()).collect()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion> {
        self.calls.lock().push((system.to_string(), user.to_string()));
        Ok(Completion {
            text: (self.responder)(system, user),
            usage: self.usage,
        })
    }

    fn model(&self) -> &str {
        "gpt-4o-mini"
    }

    fn is_billed(&self) -> bool {
        self.billed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashed_vectors_are_unit_and_deterministic() {
        let mock = MockEmbeddingProvider::new(16);
        let a = mock.embed(&["hello".to_string()]).await.unwrap();
        let b = mock.embed(&["hello".to_string()]).await.unwrap();
        assert_eq!(a.vectors, b.vectors);
        assert!((l2_norm(&a.vectors[0]) - 1.0).abs() < 1e-5);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn pinned_vector_wins() {
        let mock = MockEmbeddingProvider::new(2);
        mock.pin("x", vec![1.0, 0.0]);
        let batch = mock.embed(&["x".to_string()]).await.unwrap();
        assert_eq!(batch.vectors[0], vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn completion_records_prompts() {
        let mock = MockCompletionProvider::always("ok").unbilled();
        let c = mock.complete("sys", "hello").await.unwrap();
        assert_eq!(c.text, "ok");
        assert!(!mock.is_billed());
        assert_eq!(mock.user_messages(), vec!["hello".to_string()]);
    }
}
