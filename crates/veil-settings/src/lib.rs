//! # veil-settings
//!
//! Configuration management with layered sources for the Veil content filter.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`VeilSettings::default()`]
//! 2. **User file**: `~/.veil/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `VEIL_*` overrides (highest priority)
//!
//! User-editable filter state (lists, subjects, default action) lives in the
//! persistent store, not here; this crate only carries engine tuning and
//! provider wiring.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
