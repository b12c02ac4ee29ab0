//! Provider construction from inference settings.

use std::sync::Arc;

use async_trait::async_trait;
use veil_core::{EmbedType, InferenceSettings, LlmType};
use veil_settings::ClassifierSettings;
use veil_store::PreferencesRepository;

use crate::errors::{InferenceError, Result};
use crate::openai::{OpenAiCompletions, OpenAiEmbeddings};
use crate::provider::{CompletionProvider, EmbeddingProvider};

/// Source of the current inference settings, read at call time.
#[async_trait]
pub trait InferenceSettingsProvider: Send + Sync {
    /// Current provider selection.
    async fn current(&self) -> Result<InferenceSettings>;
}

#[async_trait]
impl InferenceSettingsProvider for PreferencesRepository {
    async fn current(&self) -> Result<InferenceSettings> {
        Ok(self.inference_settings().await?)
    }
}

#[async_trait]
impl InferenceSettingsProvider for InferenceSettings {
    async fn current(&self) -> Result<InferenceSettings> {
        Ok(self.clone())
    }
}

/// Builds providers for a settings snapshot.
///
/// `Ok(None)` means the stage is disabled. A selected provider without its
/// token or URL is [`InferenceError::MissingConfig`].
pub trait ProviderFactory: Send + Sync {
    /// Embedding provider for `settings`.
    fn embedding_provider(&self, settings: &InferenceSettings) -> Result<Option<Arc<dyn EmbeddingProvider>>>;

    /// Completion provider for `settings`.
    fn completion_provider(&self, settings: &InferenceSettings) -> Result<Option<Arc<dyn CompletionProvider>>>;
}

/// [`ProviderFactory`] producing the reqwest clients in [`crate::openai`].
pub struct HttpProviderFactory {
    client: reqwest::Client,
    embedding_model: String,
    completion_model: String,
}

impl HttpProviderFactory {
    /// Factory using the models named in `config`.
    pub fn new(config: &ClassifierSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            embedding_model: config.embedding_model.clone(),
            completion_model: config.completion_model.clone(),
        }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn embedding_provider(&self, settings: &InferenceSettings) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
        match settings.embed_type {
            EmbedType::None => Ok(None),
            EmbedType::Openai => {
                let token = required(settings.embed_token.as_deref(), "embedToken is required for openai embeddings")?;
                Ok(Some(Arc::new(OpenAiEmbeddings::new(
                    self.client.clone(),
                    non_empty(settings.embed_url.as_deref()),
                    token,
                    self.embedding_model.clone(),
                ))))
            }
        }
    }

    fn completion_provider(&self, settings: &InferenceSettings) -> Result<Option<Arc<dyn CompletionProvider>>> {
        match settings.llm_type {
            LlmType::None => Ok(None),
            LlmType::Openai => {
                let token = required(settings.llm_token.as_deref(), "llmToken is required for the openai LLM")?;
                let mut client =
                    OpenAiCompletions::openai(self.client.clone(), token, self.completion_model.clone());
                if let Some(url) = non_empty(settings.llm_url.as_deref()) {
                    client = client.with_base_url(url);
                }
                Ok(Some(Arc::new(client)))
            }
            LlmType::Local => {
                let url = required(settings.llm_url.as_deref(), "llmURL is required for a local LLM")?;
                Ok(Some(Arc::new(OpenAiCompletions::local(
                    self.client.clone(),
                    url,
                    non_empty(settings.llm_token.as_deref()).map(str::to_string),
                    self.completion_model.clone(),
                ))))
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: Option<&'a str>, message: &str) -> Result<&'a str> {
    non_empty(value).ok_or_else(|| InferenceError::MissingConfig(message.to_string()))
}
