//! Scalar preferences kept in the `settings` store.

use serde::Serialize;
use serde::de::DeserializeOwned;
use veil_core::{FilterAction, InferenceSettings, MlMethod, StoreName};

use crate::errors::{Result, decode};
use crate::gateway::StoreGateway;

const STORE: StoreName = StoreName::Settings;

/// Key of the global default action.
pub const DEFAULT_ACTION_KEY: &str = "defaultAction";
/// Key of the global classification method.
pub const ML_METHOD_KEY: &str = "mlMethod";
/// Key of the semantic filtering master switch.
pub const ML_ENABLED_KEY: &str = "mlEnabled";
/// Key of the persisted inference settings.
pub const INFERENCE_SETTINGS_KEY: &str = "inferenceSettings";

/// Settings keys whose change should trigger a reconciliation pass.
pub const FILTERING_KEYS: [&str; 4] = [
    DEFAULT_ACTION_KEY,
    ML_METHOD_KEY,
    ML_ENABLED_KEY,
    INFERENCE_SETTINGS_KEY,
];

/// Global filtering preferences.
#[derive(Clone)]
pub struct PreferencesRepository {
    gateway: StoreGateway,
    inference_fallback: InferenceSettings,
}

impl PreferencesRepository {
    /// Create a repository over the gateway.
    pub fn new(gateway: StoreGateway) -> Self {
        Self {
            gateway,
            inference_fallback: InferenceSettings::default(),
        }
    }

    /// Inference settings to report when none are persisted.
    #[must_use]
    pub fn with_inference_fallback(mut self, fallback: InferenceSettings) -> Self {
        self.inference_fallback = fallback;
        self
    }

    /// Global default action (blur when unset).
    pub async fn default_action(&self) -> Result<FilterAction> {
        self.read_or(DEFAULT_ACTION_KEY, FilterAction::default()).await
    }

    /// Set the global default action.
    pub async fn set_default_action(&self, action: FilterAction) -> Result<()> {
        self.write(DEFAULT_ACTION_KEY, &action).await
    }

    /// Global classification method (`auto` when unset).
    pub async fn ml_method(&self) -> Result<MlMethod> {
        self.read_or(ML_METHOD_KEY, MlMethod::default()).await
    }

    /// Set the global classification method.
    pub async fn set_ml_method(&self, method: MlMethod) -> Result<()> {
        self.write(ML_METHOD_KEY, &method).await
    }

    /// Whether semantic filtering is switched on (on when unset).
    pub async fn ml_enabled(&self) -> Result<bool> {
        self.read_or(ML_ENABLED_KEY, true).await
    }

    /// Switch semantic filtering on or off.
    pub async fn set_ml_enabled(&self, enabled: bool) -> Result<()> {
        self.write(ML_ENABLED_KEY, &enabled).await
    }

    /// Persisted inference settings, or the configured fallback.
    pub async fn inference_settings(&self) -> Result<InferenceSettings> {
        self.read_or(INFERENCE_SETTINGS_KEY, self.inference_fallback.clone())
            .await
    }

    /// Persist inference settings.
    pub async fn set_inference_settings(&self, settings: &InferenceSettings) -> Result<()> {
        self.write(INFERENCE_SETTINGS_KEY, settings).await
    }

    async fn read_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        match self.gateway.get(STORE, key).await? {
            Some(value) => decode(STORE, key, value),
            None => Ok(default),
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.gateway.set(STORE, key, value).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use veil_core::{EmbedType, LlmType};

    use super::*;
    use crate::errors::StoreError;

    #[tokio::test]
    async fn defaults_when_unset() {
        let prefs = PreferencesRepository::new(StoreGateway::in_memory());
        assert_eq!(prefs.default_action().await.unwrap(), FilterAction::Blur);
        assert_eq!(prefs.ml_method().await.unwrap(), MlMethod::Auto);
        assert!(prefs.ml_enabled().await.unwrap());
        assert_eq!(prefs.inference_settings().await.unwrap(), InferenceSettings::default());
    }

    #[tokio::test]
    async fn values_roundtrip() {
        let prefs = PreferencesRepository::new(StoreGateway::in_memory());
        prefs.set_default_action(FilterAction::Hide).await.unwrap();
        prefs.set_ml_method(MlMethod::Embeddings).await.unwrap();
        prefs.set_ml_enabled(false).await.unwrap();
        assert_eq!(prefs.default_action().await.unwrap(), FilterAction::Hide);
        assert_eq!(prefs.ml_method().await.unwrap(), MlMethod::Embeddings);
        assert!(!prefs.ml_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn stored_inference_beats_fallback() {
        let fallback = InferenceSettings {
            llm_type: LlmType::Local,
            llm_url: Some("http://localhost:8080".into()),
            ..InferenceSettings::default()
        };
        let prefs = PreferencesRepository::new(StoreGateway::in_memory())
            .with_inference_fallback(fallback.clone());
        assert_eq!(prefs.inference_settings().await.unwrap(), fallback);

        let stored = InferenceSettings {
            embed_type: EmbedType::Openai,
            embed_token: Some("sk".into()),
            ..InferenceSettings::default()
        };
        prefs.set_inference_settings(&stored).await.unwrap();
        assert_eq!(prefs.inference_settings().await.unwrap(), stored);
    }

    #[tokio::test]
    async fn corrupted_action_is_validation_error() {
        let gateway = StoreGateway::in_memory();
        gateway
            .set(STORE, DEFAULT_ACTION_KEY, serde_json::json!("explode"))
            .await
            .unwrap();
        let prefs = PreferencesRepository::new(gateway);
        assert_matches!(prefs.default_action().await, Err(StoreError::Validation { .. }));
    }
}
