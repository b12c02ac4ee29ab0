//! Engine error types.

use veil_inference::InferenceError;
use veil_store::StoreError;

use crate::dom::ElementId;

/// Errors from reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A filter was applied to an element that already carries one.
    ///
    /// Processing order makes this unreachable; seeing it means a bug.
    #[error("element {0} is already filtered")]
    AlreadyFiltered(ElementId),

    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Semantic classification failed in a way the caller must see
    /// (budget exceeded or missing provider configuration).
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl EngineError {
    /// Whether this is a budget-exceeded condition.
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::Inference(e) if e.is_budget_exceeded())
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
