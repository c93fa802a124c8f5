//! Request/response bridge for an isolated host (UI worker, embedding app).
//!
//! Each request carries an `id` that is echoed back unchanged, so a caller
//! can match responses even when they come back out of order. Two methods
//! are served:
//!
//!   `cache`   `["get", key]` or `["set", key, value]`
//!   `intent`  `[target, method, args?]`, answered with the transactions of
//!             the resolved plan for the bridge's sender

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::Cache;
use crate::error::{Result, RuntimeError};
use crate::session::Organization;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    fn reply(id: Value, outcome: Result<Value>) -> Self {
        match outcome {
            Ok(result) => Self {
                id,
                result: Some(result),
                error: None,
            },
            Err(err) => Self {
                id,
                result: None,
                error: Some(err.to_string()),
            },
        }
    }
}

pub struct Bridge {
    org: Arc<Organization>,
    cache: Arc<dyn Cache>,
    sender: String,
}

impl Bridge {
    pub fn new(org: Arc<Organization>, cache: Arc<dyn Cache>, sender: &str) -> Self {
        Self {
            org,
            cache,
            sender: sender.to_string(),
        }
    }

    /// Serve one request. Failures become error responses; this never fails.
    pub async fn handle(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let outcome = match request.method.as_str() {
            "cache" => self.cache_request(&request.params).await,
            "intent" => self.intent_request(&request.params).await,
            other => Err(bad_request(format!("unknown method: {other}"))),
        };
        if let Err(err) = &outcome {
            tracing::debug!(method = %request.method, error = %err, "bridge request failed");
        }
        ResponseEnvelope::reply(request.id, outcome)
    }

    async fn cache_request(&self, params: &[Value]) -> Result<Value> {
        match params {
            [Value::String(op), Value::String(key)] if op == "get" => {
                Ok(self.cache.get(key).await.unwrap_or(Value::Null))
            }
            [Value::String(op), Value::String(key), value] if op == "set" => {
                self.cache.set(key, value.clone()).await?;
                Ok(Value::Null)
            }
            _ => Err(bad_request(
                "cache expects [\"get\", key] or [\"set\", key, value]".to_string(),
            )),
        }
    }

    async fn intent_request(&self, params: &[Value]) -> Result<Value> {
        let (target, method, args) = match params {
            [Value::String(target), Value::String(method)] => (target, method, Vec::new()),
            [Value::String(target), Value::String(method), Value::Array(args)] => {
                (target, method, args.clone())
            }
            _ => {
                return Err(bad_request(
                    "intent expects [target, method, args?]".to_string(),
                ))
            }
        };
        let plan = self
            .org
            .resolve_intent(&self.sender, target, method, args)
            .await?;
        Ok(serde_json::to_value(plan.to_transactions())?)
    }
}

fn bad_request(message: String) -> RuntimeError {
    RuntimeError::BadRequest(message)
}
