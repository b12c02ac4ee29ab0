//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON is accepted; missing fields keep their production default.

use serde::{Deserialize, Serialize};
use veil_core::InferenceSettings;

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VeilSettings {
    /// Reconciliation loop tuning.
    pub engine: EngineSettings,
    /// Semantic classifier tuning.
    pub classifier: ClassifierSettings,
    /// Provider selection used when the store has no inference settings.
    pub inference: InferenceSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Reconciliation loop tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Delay after the last DOM mutation before a pass runs.
    pub debounce_ms: u64,
    /// Interval between word-statistics flushes.
    pub stats_flush_interval_ms: u64,
    /// Similar siblings needed for an ancestor to count as a feed item.
    pub min_similar_siblings: usize,
    /// Pixel tolerance when comparing sibling widths/heights.
    pub geometry_tolerance_px: f64,
    /// Seconds between liveness sweeps of tracked elements outside passes.
    pub liveness_sweep_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            stats_flush_interval_ms: 10_000,
            min_similar_siblings: 3,
            geometry_tolerance_px: 1.0,
            liveness_sweep_secs: 30,
        }
    }
}

/// Semantic classifier tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierSettings {
    /// Cosine similarity a text must exceed to pass the embedding gate.
    pub similarity_threshold: f32,
    /// Minimum preprocessed text length worth classifying.
    pub min_text_length: usize,
    /// Largest number of texts per embedding request.
    pub max_batch_size: usize,
    /// How long the coalescer waits for more texts before flushing.
    pub batch_window_ms: u64,
    /// Extra attempts when the model's JSON cannot be parsed.
    pub parse_retries: u32,
    /// Number of keywords requested when populating a subject.
    pub keyword_count: usize,
    /// Embedding model name.
    pub embedding_model: String,
    /// Completion model name.
    pub completion_model: String,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.76,
            min_text_length: veil_core::text::DEFAULT_MIN_ML_TEXT_LENGTH,
            max_batch_size: 16,
            batch_window_ms: 50,
            parse_retries: 2,
            keyword_count: 10,
            embedding_model: "text-embedding-3-small".to_string(),
            completion_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}
