//! Provider selection for the semantic pipeline.

use serde::{Deserialize, Serialize};

/// Embedding provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedType {
    /// `OpenAI` embeddings endpoint.
    Openai,
    /// Embeddings disabled.
    #[default]
    None,
}

/// Completion (LLM) provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    /// `OpenAI` chat completions.
    Openai,
    /// Self-hosted OpenAI-compatible server (unbilled).
    Local,
    /// LLM confirmation disabled.
    #[default]
    None,
}

/// Which providers the classifier may call, and how to reach them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InferenceSettings {
    /// Embedding provider.
    pub embed_type: EmbedType,
    /// Base URL override for the embedding provider.
    #[serde(rename = "embedURL", skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
    /// API token for the embedding provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed_token: Option<String>,
    /// Completion provider.
    pub llm_type: LlmType,
    /// Base URL for the completion provider (required for `local`).
    #[serde(rename = "llmURL", skip_serializing_if = "Option::is_none")]
    pub llm_url: Option<String>,
    /// API token for the completion provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_token: Option<String>,
}

impl InferenceSettings {
    /// Whether any semantic stage is configured.
    pub fn any_enabled(&self) -> bool {
        self.embed_type != EmbedType::None || self.llm_type != LlmType::None
    }
}
