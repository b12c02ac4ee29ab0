//! Cost ledger for billed inference calls.
//!
//! The ledger lives under the `costLedger` key of the `settings` store. It
//! rolls over (cost back to zero) on the first read after its reset interval
//! elapses.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use veil_core::StoreName;

use crate::errors::{Result, StoreError, decode};
use crate::gateway::StoreGateway;

const STORE: StoreName = StoreName::Settings;

/// Settings key holding the ledger.
pub const COST_LEDGER_KEY: &str = "costLedger";

/// How often accumulated cost returns to zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetInterval {
    /// Accumulate forever.
    #[default]
    Never,
    /// Reset when the UTC date changes.
    Daily,
    /// Reset seven days after the last reset.
    Weekly,
    /// Reset when the UTC calendar month changes.
    Monthly,
}

impl ResetInterval {
    /// Whether a ledger last reset at `last` is due at `now`.
    pub fn is_due(self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Never => false,
            Self::Daily => now.date_naive() > last.date_naive(),
            Self::Weekly => now - last >= Duration::days(7),
            Self::Monthly => (now.year(), now.month()) > (last.year(), last.month()),
        }
    }
}

/// Accumulated spend and its limit, in US dollars.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLedger {
    /// Spend since the last reset.
    pub cost: f64,
    /// Spend ceiling; `None` means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_limit: Option<f64>,
    /// When the cost was last zeroed.
    pub last_reset_date: DateTime<Utc>,
    /// Automatic reset cadence.
    #[serde(default)]
    pub reset_interval: ResetInterval,
}

impl CostLedger {
    /// Empty ledger reset at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            cost: 0.0,
            budget_limit: None,
            last_reset_date: now,
            reset_interval: ResetInterval::Never,
        }
    }

    /// True once spend has passed the limit. Reaching it exactly is allowed.
    pub fn is_over_budget(&self) -> bool {
        self.budget_limit.is_some_and(|limit| self.cost > limit)
    }

    /// Zero the cost if the reset interval has elapsed. Returns whether it did.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> bool {
        if !self.reset_interval.is_due(self.last_reset_date, now) {
            return false;
        }
        self.cost = 0.0;
        self.last_reset_date = now;
        true
    }
}

/// Ledger access used by the classifier's budget guard.
#[async_trait]
pub trait CostLedgerStore: Send + Sync {
    /// Current ledger, rolled over if due.
    async fn get(&self) -> Result<CostLedger>;
    /// Add spend; returns the updated ledger.
    async fn add(&self, delta: f64) -> Result<CostLedger>;
    /// Zero the accumulated cost.
    async fn reset_cost(&self) -> Result<()>;
    /// Set or clear the spend ceiling.
    async fn set_budget_limit(&self, limit: Option<f64>) -> Result<()>;
}

/// [`CostLedgerStore`] persisted through the gateway.
///
/// Read-modify-write cycles are serialized within the process so concurrent
/// billed calls do not lose each other's spend.
pub struct LedgerRepository {
    gateway: StoreGateway,
    lock: Mutex<()>,
}

impl LedgerRepository {
    /// Create a repository over the gateway.
    pub fn new(gateway: StoreGateway) -> Self {
        Self {
            gateway,
            lock: Mutex::new(()),
        }
    }

    /// Change the reset cadence.
    pub async fn set_reset_interval(&self, interval: ResetInterval) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut ledger = self.load(Utc::now()).await?;
        ledger.reset_interval = interval;
        self.store(&ledger).await
    }

    /// Read the ledger as of `now`, persisting a rollover if one happened.
    pub async fn ledger_at(&self, now: DateTime<Utc>) -> Result<CostLedger> {
        let _guard = self.lock.lock().await;
        self.load(now).await
    }

    async fn load(&self, now: DateTime<Utc>) -> Result<CostLedger> {
        let Some(value) = self.gateway.get(STORE, COST_LEDGER_KEY).await? else {
            return Ok(CostLedger::new(now));
        };
        let mut ledger: CostLedger = decode(STORE, COST_LEDGER_KEY, value)?;
        if ledger.roll_over(now) {
            info!(interval = ?ledger.reset_interval, "cost ledger rolled over");
            self.store(&ledger).await?;
        }
        Ok(ledger)
    }

    async fn store(&self, ledger: &CostLedger) -> Result<()> {
        let value = serde_json::to_value(ledger)?;
        self.gateway.set(STORE, COST_LEDGER_KEY, value).await
    }
}

#[async_trait]
impl CostLedgerStore for LedgerRepository {
    async fn get(&self) -> Result<CostLedger> {
        self.ledger_at(Utc::now()).await
    }

    async fn add(&self, delta: f64) -> Result<CostLedger> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(StoreError::InvalidInput(format!(
                "cost delta must be a non-negative number, got {delta}"
            )));
        }
        let _guard = self.lock.lock().await;
        let mut ledger = self.load(Utc::now()).await?;
        ledger.cost += delta;
        self.store(&ledger).await?;
        if ledger.is_over_budget() {
            warn!(cost = ledger.cost, limit = ?ledger.budget_limit, "cost ledger over budget");
        }
        Ok(ledger)
    }

    async fn reset_cost(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        let now = Utc::now();
        let mut ledger = self.load(now).await?;
        ledger.cost = 0.0;
        ledger.last_reset_date = now;
        self.store(&ledger).await
    }

    async fn set_budget_limit(&self, limit: Option<f64>) -> Result<()> {
        if let Some(limit) = limit
            && (!limit.is_finite() || limit < 0.0)
        {
            return Err(StoreError::InvalidInput(format!(
                "budget limit must be a non-negative number, got {limit}"
            )));
        }
        let _guard = self.lock.lock().await;
        let mut ledger = self.load(Utc::now()).await?;
        ledger.budget_limit = limit;
        self.store(&ledger).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
