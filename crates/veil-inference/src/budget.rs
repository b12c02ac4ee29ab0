//! Budget enforcement over the cost ledger.

use std::sync::Arc;

use tracing::{debug, warn};
use veil_store::CostLedgerStore;

use crate::errors::{InferenceError, Result};
use crate::pricing::cost_of;
use crate::provider::Usage;

/// Checks spend before billed calls and records it after them.
#[derive(Clone)]
pub struct BudgetGuard {
    ledger: Arc<dyn CostLedgerStore>,
}

impl BudgetGuard {
    /// Guard the given ledger.
    pub fn new(ledger: Arc<dyn CostLedgerStore>) -> Self {
        Self { ledger }
    }

    /// Fail with [`InferenceError::BudgetExceeded`] once spend is past the limit.
    pub async fn check(&self) -> Result<()> {
        let ledger = self.ledger.get().await?;
        if let Some(limit) = ledger.budget_limit
            && ledger.cost > limit
        {
            warn!(cost = ledger.cost, limit, "refusing billed call: budget exceeded");
            return Err(InferenceError::BudgetExceeded {
                cost: ledger.cost,
                limit,
            });
        }
        Ok(())
    }

    /// Add the cost of one call to the ledger. Returns the dollars added.
    pub async fn record(&self, model: &str, usage: Usage) -> Result<f64> {
        let cost = cost_of(model, usage);
        if cost > 0.0 {
            let _ = self.ledger.add(cost).await?;
            debug!(model, cost, "recorded spend");
        }
        Ok(cost)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use veil_store::{LedgerRepository, StoreGateway};

    use super::*;

    fn guard() -> (BudgetGuard, Arc<LedgerRepository>) {
        let ledger = Arc::new(LedgerRepository::new(StoreGateway::in_memory()));
        (BudgetGuard::new(ledger.clone()), ledger)
    }

    #[tokio::test]
    async fn no_limit_never_blocks() {
        let (guard, ledger) = guard();
        let _ = ledger.add(1_000.0).await.unwrap();
        guard.check().await.unwrap();
    }

    #[tokio::test]
    async fn blocks_only_when_strictly_over() {
        let (guard, ledger) = guard();
        ledger.set_budget_limit(Some(1.0)).await.unwrap();
        let _ = ledger.add(1.0).await.unwrap();
        guard.check().await.unwrap();
        let _ = ledger.add(0.01).await.unwrap();
        assert_matches!(guard.check().await, Err(InferenceError::BudgetExceeded { .. }));
    }

    #[tokio::test]
    async fn record_adds_priced_usage() {
        let (guard, ledger) = guard();
        let cost = guard
            .record(
                "gpt-4o-mini",
                Usage {
                    input_tokens: 1_000_000,
                    output_tokens: 0,
                },
            )
            .await
            .unwrap();
        assert!((cost - 0.15).abs() < 1e-9);
        assert!((ledger.get().await.unwrap().cost - 0.15).abs() < 1e-9);
    }

    #[tokio::test]
    async fn zero_usage_does_not_touch_ledger() {
        let (guard, ledger) = guard();
        let cost = guard.record("gpt-4o", Usage::default()).await.unwrap();
        assert!(cost.abs() < f64::EPSILON);
        assert!(ledger.get().await.unwrap().cost.abs() < f64::EPSILON);
    }
}
