//! Inference error types.

use std::sync::Arc;

use veil_store::StoreError;

/// Errors from embedding, completion, and classification calls.
///
/// Malformed model output never surfaces here: it is retried and then read
/// as "no match". [`InferenceError::BudgetExceeded`] and
/// [`InferenceError::MissingConfig`] are raised before any request is sent.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or error message.
        message: String,
    },

    /// The selected provider lacks a token or URL.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// Accumulated spend is past the budget limit.
    #[error("budget exceeded: spent ${cost:.4} of ${limit:.4}")]
    BudgetExceeded {
        /// Current spend.
        cost: f64,
        /// Configured limit.
        limit: f64,
    },

    /// The provider answered with a well-formed but unusable payload.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// Two vectors that must be compared have different lengths.
    #[error("vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch {
        /// Length of the first vector.
        left: usize,
        /// Length of the second vector.
        right: usize,
    },

    /// Reading or writing the cost ledger or settings failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error shared by every waiter on one coalesced computation.
    #[error("{0}")]
    Shared(Arc<InferenceError>),
}

impl InferenceError {
    /// Whether this is (or wraps) a budget-exceeded condition.
    pub fn is_budget_exceeded(&self) -> bool {
        match self {
            Self::BudgetExceeded { .. } => true,
            Self::Shared(inner) => inner.is_budget_exceeded(),
            _ => false,
        }
    }

    /// Whether this is (or wraps) a missing-configuration condition.
    pub fn is_missing_config(&self) -> bool {
        match self {
            Self::MissingConfig(_) => true,
            Self::Shared(inner) => inner.is_missing_config(),
            _ => false,
        }
    }
}

impl From<Arc<InferenceError>> for InferenceError {
    fn from(shared: Arc<InferenceError>) -> Self {
        Self::Shared(shared)
    }
}

/// Result alias for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;
