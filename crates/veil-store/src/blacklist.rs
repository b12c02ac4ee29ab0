//! Disabled-site (blacklist) CRUD.

use serde_json::Value;
use veil_core::StoreName;

use crate::errors::{Result, StoreError};
use crate::gateway::StoreGateway;

const STORE: StoreName = StoreName::Blacklist;

/// Hostnames on which filtering is disabled.
#[derive(Clone)]
pub struct BlacklistRepository {
    gateway: StoreGateway,
}

impl BlacklistRepository {
    /// Create a repository over the gateway.
    pub fn new(gateway: StoreGateway) -> Self {
        Self { gateway }
    }

    /// All disabled hostnames, sorted.
    pub async fn disabled_sites(&self) -> Result<Vec<String>> {
        Ok(self.gateway.get_all(STORE).await?.into_keys().collect())
    }

    /// Whether filtering is disabled for `hostname`.
    pub async fn is_disabled(&self, hostname: &str) -> Result<bool> {
        let host = normalize_host(hostname);
        if host.is_empty() {
            return Ok(false);
        }
        Ok(self.gateway.get(STORE, &host).await?.is_some())
    }

    /// Disable filtering for `hostname`.
    pub async fn disable_site(&self, hostname: &str) -> Result<()> {
        let host = normalize_host(hostname);
        if host.is_empty() {
            return Err(StoreError::InvalidInput("hostname must not be blank".into()));
        }
        self.gateway.set(STORE, &host, Value::Bool(true)).await
    }

    /// Re-enable filtering for `hostname`.
    pub async fn enable_site(&self, hostname: &str) -> Result<()> {
        self.gateway.delete(STORE, &normalize_host(hostname)).await
    }
}

/// Lowercase a hostname and drop a leading `www.`.
pub fn normalize_host(hostname: &str) -> String {
    let lowered = hostname.trim().to_ascii_lowercase();
    lowered.strip_prefix("www.").unwrap_or(&lowered).to_string()
}
