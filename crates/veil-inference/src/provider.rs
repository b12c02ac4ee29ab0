//! Provider traits for embeddings and completions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Token counts reported by a provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Prompt (input) tokens.
    pub input_tokens: u64,
    /// Generated (output) tokens.
    pub output_tokens: u64,
}

/// Result of one batched embedding request.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingBatch {
    /// One vector per input text, in input order.
    pub vectors: Vec<Vec<f32>>,
    /// Tokens consumed.
    pub usage: Usage,
}

/// Result of one completion request.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    /// Assistant message text.
    pub text: String,
    /// Tokens consumed.
    pub usage: Usage,
}

/// Turns texts into vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch>;

    /// Model name used for pricing.
    fn model(&self) -> &str;

    /// Whether calls cost money and count against the budget.
    fn is_billed(&self) -> bool {
        true
    }
}

/// Answers a system + user prompt pair.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run one completion.
    async fn complete(&self, system: &str, user: &str) -> Result<Completion>;

    /// Model name used for pricing.
    fn model(&self) -> &str;

    /// Whether calls cost money and count against the budget.
    fn is_billed(&self) -> bool {
        true
    }
}
