//! Store error types.

use veil_core::StoreName;

/// Errors from persistence operations.
///
/// Storage errors are surfaced to the caller unchanged; the core never
/// retries them. [`StoreError::Validation`] means a persisted value failed
/// its shape check, which indicates corrupted state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store has not been opened or was closed.
    #[error("store not initialized: {0}")]
    NotInitialized(String),

    /// A required key is absent.
    #[error("{store}/{key} not found")]
    NotFound {
        /// Store that was searched.
        store: StoreName,
        /// Missing key.
        key: String,
    },

    /// A key that must be unique already exists.
    #[error("{store}/{key} already exists")]
    Conflict {
        /// Store holding the key.
        store: StoreName,
        /// Conflicting key.
        key: String,
    },

    /// A persisted value does not have the expected shape.
    #[error("invalid value at {store}/{key}: {message}")]
    Validation {
        /// Store holding the value.
        store: StoreName,
        /// Key of the value.
        key: String,
        /// Decoder message.
        message: String,
    },

    /// An argument supplied by the caller is unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The database backend failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serializing a value failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Decode a persisted value into `T`, reporting shape errors with location.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    store: StoreName,
    key: &str,
    value: serde_json::Value,
) -> Result<T> {
    serde_json::from_value(value).map_err(|e| StoreError::Validation {
        store,
        key: key.to_string(),
        message: e.to_string(),
    })
}
