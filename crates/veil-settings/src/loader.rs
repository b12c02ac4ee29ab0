//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`VeilSettings::default()`]
//! 2. If `~/.veil/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::VeilSettings;

/// Resolve the path to the settings file (`~/.veil/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".veil").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<VeilSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<VeilSettings> {
    let defaults = serde_json::to_value(VeilSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: VeilSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `VEIL_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut VeilSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Each variable has strict parsing rules; invalid values are ignored with
/// a warning and the file/default value is kept.
pub fn apply_overrides_from<F>(settings: &mut VeilSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Engine ──────────────────────────────────────────────────────
    if let Some(v) = env.u64_in("VEIL_DEBOUNCE_MS", 0, 60_000) {
        settings.engine.debounce_ms = v;
    }
    if let Some(v) = env.u64_in("VEIL_STATS_FLUSH_MS", 100, 3_600_000) {
        settings.engine.stats_flush_interval_ms = v;
    }

    // ── Classifier ──────────────────────────────────────────────────
    if let Some(v) = env.f32_in("VEIL_SIMILARITY_THRESHOLD", 0.0, 1.0) {
        settings.classifier.similarity_threshold = v;
    }

    // ── Inference ───────────────────────────────────────────────────
    if let Some(v) = env.string("VEIL_EMBED_TOKEN") {
        settings.inference.embed_token = Some(v);
    }
    if let Some(v) = env.string("VEIL_LLM_TOKEN") {
        settings.inference.llm_token = Some(v);
    }
    if let Some(v) = env.string("VEIL_LLM_URL") {
        settings.inference.llm_url = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("VEIL_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

fn validate(settings: &VeilSettings) -> Result<()> {
    let threshold = settings.classifier.similarity_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(SettingsError::InvalidValue(format!(
            "similarityThreshold must be within [0, 1], got {threshold}"
        )));
    }
    if settings.classifier.max_batch_size == 0 {
        return Err(SettingsError::InvalidValue(
            "maxBatchSize must be at least 1".to_string(),
        ));
    }
    Ok(())
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = val.trim().parse::<u64>().ok().filter(|v| (min..=max).contains(v));
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn f32_in(&self, name: &str, min: f32, max: f32) -> Option<f32> {
        let val = (self.lookup)(name)?;
        let result = val.trim().parse::<f32>().ok().filter(|v| (min..=max).contains(v));
        if result.is_none() {
            warn!(key = name, value = %val, "invalid f32 env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> VeilSettings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut settings = VeilSettings::default();
        apply_overrides_from(&mut settings, |name| map.get(name).cloned());
        settings
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"engine": {"debounceMs": 500, "minSimilarSiblings": 3}});
        let source = serde_json::json!({"engine": {"debounceMs": 100}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["engine"]["debounceMs"], 100);
        assert_eq!(merged["engine"]["minSimilarSiblings"], 3);
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3]}),
            serde_json::json!({"items": [4]}),
        );
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let s = overrides(&[
            ("VEIL_DEBOUNCE_MS", "250"),
            ("VEIL_SIMILARITY_THRESHOLD", "0.8"),
            ("VEIL_LLM_TOKEN", "sk-test"),
            ("VEIL_LOG_LEVEL", "veil_engine=debug"),
        ]);
        assert_eq!(s.engine.debounce_ms, 250);
        assert!((s.classifier.similarity_threshold - 0.8).abs() < 1e-6);
        assert_eq!(s.inference.llm_token.as_deref(), Some("sk-test"));
        assert_eq!(s.logging.level, "veil_engine=debug");
    }

    #[test]
    fn invalid_env_values_ignored() {
        let s = overrides(&[
            ("VEIL_DEBOUNCE_MS", "soon"),
            ("VEIL_SIMILARITY_THRESHOLD", "1.5"),
            ("VEIL_LLM_URL", ""),
        ]);
        assert_eq!(s.engine.debounce_ms, 500);
        assert!((s.classifier.similarity_threshold - 0.76).abs() < 1e-6);
        assert!(s.inference.llm_url.is_none());
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(s.engine, crate::types::EngineSettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"classifier": {"maxBatchSize": 4}, "inference": {"llmType": "local"}}"#,
        )
        .unwrap();
        let s = load_settings_from_path(&path).unwrap();
        assert_eq!(s.classifier.max_batch_size, 4);
        assert_eq!(s.classifier.batch_window_ms, 50);
        assert_eq!(s.inference.llm_type, veil_core::LlmType::Local);
    }

    #[test]
    fn invalid_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn out_of_range_file_value_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"classifier": {"maxBatchSize": 0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }
}
