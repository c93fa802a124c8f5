//! Key-value cache boundary.
//!
//! The runtime only depends on the `Cache` trait. `MemoryCache` is the
//! in-process implementation used by the bridge, the cached oracle and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{watch, Mutex};

use crate::error::Result;
use crate::subscription::Subscription;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Live view of `key`: the current value (`None` if unset), then every
    /// later update. Never ends on its own; drop it to unsubscribe.
    async fn observe(&self, key: &str) -> Subscription<Option<Value>>;
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, watch::Sender<Option<Value>>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().await;
        entries.get(key).and_then(|tx| tx.borrow().clone())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(tx) => {
                tx.send_replace(Some(value));
            }
            None => {
                let (tx, _) = watch::channel(Some(value));
                entries.insert(key.to_string(), tx);
            }
        }
        Ok(())
    }

    async fn observe(&self, key: &str) -> Subscription<Option<Value>> {
        let mut entries = self.entries.lock().await;
        let tx = entries
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(None).0);
        Subscription::new(tx.subscribe())
    }
}
