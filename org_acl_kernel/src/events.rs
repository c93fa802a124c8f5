/// Organization ACL Kernel: Event Definitions
///
/// Events are pure data parsed from web3-style log records:
///
/// ```json
/// {"event": "SetPermission", "blockNumber": 7, "logIndex": 0,
///  "returnValues": {"app": "0x..", "role": "ADD", "entity": "0x..", "allowed": true}}
/// ```
///
/// Parsing never panics: a record missing a required field is reported as
/// `AclError::MalformedEvent` so the caller can skip it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::address::normalize;
use crate::error::AclError;

pub const PERMISSION_CHANNEL: &str = "SetPermission";
pub const MANAGER_CHANNEL: &str = "ChangePermissionManager";

/// Position of an event in the chain log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

/// A grant (`allowed = true`) or revoke of `role` on `target` for `entity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionChanged {
    pub target: String,
    pub role: String,
    pub entity: String,
    pub allowed: bool,
    pub position: Option<LogPosition>,
}

/// A change of the entity managing `role` on `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerChanged {
    pub target: String,
    pub role: String,
    pub manager: String,
    pub position: Option<LogPosition>,
}

/// One delivery from the event source: both channels, each in log order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    #[serde(default)]
    pub permission: Vec<Value>,
    #[serde(default)]
    pub manager: Vec<Value>,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.permission.is_empty() && self.manager.is_empty()
    }

    pub fn len(&self) -> usize {
        self.permission.len() + self.manager.len()
    }
}

impl PermissionChanged {
    pub fn new(target: &str, role: &str, entity: &str, allowed: bool) -> Self {
        Self {
            target: normalize(target),
            role: normalize(role),
            entity: normalize(entity),
            allowed,
            position: None,
        }
    }

    /// Place the event at a log position.
    pub fn at(mut self, block_number: u64, log_index: u64) -> Self {
        self.position = Some(LogPosition {
            block_number,
            log_index,
        });
        self
    }

    /// Parse a log record; `index` is its position in the delivered batch.
    pub fn from_value(v: &Value, index: usize) -> Result<Self, AclError> {
        let fields = LogFields::open(v, PERMISSION_CHANNEL, index)?;
        Ok(Self {
            target: normalize(fields.text("app")?),
            role: normalize(fields.text("role")?),
            entity: normalize(fields.text("entity")?),
            allowed: fields.bool("allowed")?,
            position: fields.position(),
        })
    }

    pub fn to_value(&self) -> Value {
        log_record(
            PERMISSION_CHANNEL,
            json!({
                "app": self.target,
                "role": self.role,
                "entity": self.entity,
                "allowed": self.allowed,
            }),
            self.position,
        )
    }
}

impl ManagerChanged {
    pub fn new(target: &str, role: &str, manager: &str) -> Self {
        Self {
            target: normalize(target),
            role: normalize(role),
            manager: normalize(manager),
            position: None,
        }
    }

    /// Place the event at a log position.
    pub fn at(mut self, block_number: u64, log_index: u64) -> Self {
        self.position = Some(LogPosition {
            block_number,
            log_index,
        });
        self
    }

    pub fn from_value(v: &Value, index: usize) -> Result<Self, AclError> {
        let fields = LogFields::open(v, MANAGER_CHANNEL, index)?;
        Ok(Self {
            target: normalize(fields.text("app")?),
            role: normalize(fields.text("role")?),
            manager: normalize(fields.text("manager")?),
            position: fields.position(),
        })
    }

    pub fn to_value(&self) -> Value {
        log_record(
            MANAGER_CHANNEL,
            json!({
                "app": self.target,
                "role": self.role,
                "manager": self.manager,
            }),
            self.position,
        )
    }
}

fn log_record(channel: &str, return_values: Value, position: Option<LogPosition>) -> Value {
    let mut root = Map::new();
    root.insert("event".to_string(), Value::String(channel.to_string()));
    if let Some(p) = position {
        root.insert("blockNumber".to_string(), Value::from(p.block_number));
        root.insert("logIndex".to_string(), Value::from(p.log_index));
    }
    root.insert("returnValues".to_string(), return_values);
    Value::Object(root)
}

/// Field accessor over one log record that turns every gap into a
/// `MalformedEvent` carrying the channel and batch index.
struct LogFields<'a> {
    record: &'a Map<String, Value>,
    values: &'a Map<String, Value>,
    channel: &'static str,
    index: usize,
}

impl<'a> LogFields<'a> {
    fn open(v: &'a Value, channel: &'static str, index: usize) -> Result<Self, AclError> {
        let malformed = |reason: String| AclError::MalformedEvent {
            channel,
            index,
            reason,
        };
        let record = v
            .as_object()
            .ok_or_else(|| malformed("record is not an object".to_string()))?;
        if let Some(name) = record.get("event") {
            if name.as_str() != Some(channel) {
                return Err(malformed(format!("unexpected event name {}", name)));
            }
        }
        let values = record
            .get("returnValues")
            .and_then(Value::as_object)
            .ok_or_else(|| malformed("missing 'returnValues'".to_string()))?;
        Ok(Self {
            record,
            values,
            channel,
            index,
        })
    }

    fn malformed(&self, reason: String) -> AclError {
        AclError::MalformedEvent {
            channel: self.channel,
            index: self.index,
            reason,
        }
    }

    fn text(&self, key: &str) -> Result<&'a str, AclError> {
        match self.values.get(key).and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => Ok(s),
            _ => Err(self.malformed(format!("missing '{}'", key))),
        }
    }

    fn bool(&self, key: &str) -> Result<bool, AclError> {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| self.malformed(format!("missing '{}'", key)))
    }

    fn position(&self) -> Option<LogPosition> {
        let block_number = self.record.get("blockNumber").and_then(Value::as_u64)?;
        let log_index = self.record.get("logIndex").and_then(Value::as_u64)?;
        Some(LogPosition {
            block_number,
            log_index,
        })
    }
}
