//! Forwarder oracles.
//!
//! `TimedOracle` bounds each check, `CachedOracle` memoizes answers in a
//! `Cache`, and `StaticOracle` answers from a fixed acceptance table (CLI and
//! tests). They compose: `TimedOracle<CachedOracle<StaticOracle>>`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::timeout;

use org_acl_kernel::address::{normalize, ANY_ENTITY};
use org_acl_kernel::{Entity, ForwarderOracle, OracleError};

use crate::cache::Cache;

/// Fails a check that outlives `limit` with `OracleError::Timeout`. The
/// resolver treats that as a refusal of the single hop.
pub struct TimedOracle {
    inner: Arc<dyn ForwarderOracle>,
    limit: Duration,
}

impl TimedOracle {
    pub fn new(inner: Arc<dyn ForwarderOracle>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl ForwarderOracle for TimedOracle {
    async fn can_forward(
        &self,
        forwarder: &Entity,
        sender: &str,
        script: &[u8],
    ) -> Result<bool, OracleError> {
        match timeout(self.limit, self.inner.can_forward(forwarder, sender, script)).await {
            Ok(answer) => answer,
            Err(_) => {
                tracing::warn!(
                    forwarder = %forwarder.address,
                    sender,
                    limit_ms = self.limit.as_millis() as u64,
                    "forwarder check timed out"
                );
                Err(OracleError::Timeout(self.limit.as_millis() as u64))
            }
        }
    }
}

/// Answers from the cache when possible; stores fresh answers. Errors are
/// never cached.
pub struct CachedOracle {
    inner: Arc<dyn ForwarderOracle>,
    cache: Arc<dyn Cache>,
}

impl CachedOracle {
    pub fn new(inner: Arc<dyn ForwarderOracle>, cache: Arc<dyn Cache>) -> Self {
        Self { inner, cache }
    }

    /// `canForward:<forwarder>:<sender>:<sha256(script)>`
    pub fn cache_key(forwarder: &str, sender: &str, script: &[u8]) -> String {
        format!(
            "canForward:{}:{}:{}",
            normalize(forwarder),
            normalize(sender),
            hex::encode(Sha256::digest(script))
        )
    }
}

#[async_trait]
impl ForwarderOracle for CachedOracle {
    async fn can_forward(
        &self,
        forwarder: &Entity,
        sender: &str,
        script: &[u8],
    ) -> Result<bool, OracleError> {
        let key = Self::cache_key(&forwarder.address, sender, script);
        if let Some(Value::Bool(answer)) = self.cache.get(&key).await {
            return Ok(answer);
        }
        let answer = self.inner.can_forward(forwarder, sender, script).await?;
        if let Err(err) = self.cache.set(&key, Value::Bool(answer)).await {
            tracing::warn!(error = %err, key = %key, "failed to cache forwarder answer");
        }
        Ok(answer)
    }
}

/// One accepted (forwarder, sender) pair. A sender of `ANY_ENTITY` means the
/// forwarder accepts everyone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acceptance {
    pub forwarder: String,
    pub sender: String,
}

/// File form of a `StaticOracle`: `{"accepts": [{"forwarder", "sender"}]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcceptanceTable {
    #[serde(default)]
    pub accepts: Vec<Acceptance>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "AcceptanceTable", into = "AcceptanceTable")]
pub struct StaticOracle {
    accepts: Vec<Acceptance>,
    index: HashSet<(String, String)>,
}

impl From<AcceptanceTable> for StaticOracle {
    fn from(table: AcceptanceTable) -> Self {
        Self::new(table.accepts)
    }
}

impl From<StaticOracle> for AcceptanceTable {
    fn from(oracle: StaticOracle) -> Self {
        Self {
            accepts: oracle.accepts,
        }
    }
}

impl StaticOracle {
    pub fn new(accepts: Vec<Acceptance>) -> Self {
        let index = accepts
            .iter()
            .map(|a| (normalize(&a.forwarder), normalize(&a.sender)))
            .collect();
        Self { accepts, index }
    }

    pub fn acceptances(&self) -> &[Acceptance] {
        &self.accepts
    }

    pub fn accepts(&self, forwarder: &str, sender: &str) -> bool {
        let forwarder = normalize(forwarder);
        self.index.contains(&(forwarder.clone(), normalize(sender)))
            || self.index.contains(&(forwarder, ANY_ENTITY.to_string()))
    }
}

#[async_trait]
impl ForwarderOracle for StaticOracle {
    async fn can_forward(
        &self,
        forwarder: &Entity,
        sender: &str,
        _script: &[u8],
    ) -> Result<bool, OracleError> {
        Ok(self.accepts(&forwarder.address, sender))
    }
}
