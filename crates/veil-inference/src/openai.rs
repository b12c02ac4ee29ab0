//! OpenAI-compatible HTTP clients.
//!
//! Both clients speak the `OpenAI` REST shapes, so a self-hosted server that
//! exposes `/chat/completions` works as a local LLM.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{InferenceError, Result};
use crate::provider::{Completion, CompletionProvider, EmbeddingBatch, EmbeddingProvider, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Default `OpenAI` API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl From<Option<WireUsage>> for Usage {
    fn from(wire: Option<WireUsage>) -> Self {
        wire.map_or_else(Self::default, |u| Self {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embeddings
// ─────────────────────────────────────────────────────────────────────────────

/// `POST {base}/embeddings` client.
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    base_url: String,
    token: String,
    model: String,
}

impl OpenAiEmbeddings {
    /// Create a client. `base_url` defaults to [`DEFAULT_BASE_URL`].
    pub fn new(
        client: reqwest::Client,
        base_url: Option<&str>,
        token: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: trim_base(base_url.unwrap_or(DEFAULT_BASE_URL)),
            token: token.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        if texts.is_empty() {
            return Ok(EmbeddingBatch {
                vectors: Vec::new(),
                usage: Usage::default(),
            });
        }
        debug!(model = %self.model, count = texts.len(), "requesting embeddings");
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await?;
        let parsed: EmbeddingResponse = read_json(response).await?;

        if parsed.data.len() != texts.len() {
            return Err(InferenceError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        Ok(EmbeddingBatch {
            vectors: data.into_iter().map(|d| d.embedding).collect(),
            usage: parsed.usage.into(),
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat completions
// ─────────────────────────────────────────────────────────────────────────────

/// `POST {base}/chat/completions` client, for `OpenAI` or a local server.
pub struct OpenAiCompletions {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    model: String,
    billed: bool,
}

impl OpenAiCompletions {
    /// Billed client against the `OpenAI` API.
    pub fn openai(
        client: reqwest::Client,
        token: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: Some(token.into()),
            model: model.into(),
            billed: true,
        }
    }

    /// Unbilled client against a self-hosted server.
    pub fn local(
        client: reqwest::Client,
        base_url: &str,
        token: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
            token,
            model: model.into(),
            billed: false,
        }
    }

    /// Point the client at a different base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = trim_base(base_url);
        self
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletions {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion> {
        debug!(model = %self.model, billed = self.billed, "requesting completion");
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
        };
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(CONTENT_TYPE, "application/json")
            .json(&body);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let parsed: ChatResponse = read_json(request.send().await?).await?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| InferenceError::InvalidResponse("completion had no content".into()))?;
        Ok(Completion {
            text,
            usage: parsed.usage.into(),
        })
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_billed(&self) -> bool {
        self.billed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(InferenceError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json().await?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
