/// Organization ACL Kernel: Core Domain Types
///
/// Pure data plus read-only queries. No transition logic lives here.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::address::ANY_ENTITY;

// ── Permission State ───────────────────────────────────────────────

/// Holders and manager of one (target, role) pair.
///
/// `allowed_entities` enumerates in first-grant order. A revoke followed by a
/// re-grant moves the entity to the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRecord {
    pub allowed_entities: IndexSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
}

impl PermissionRecord {
    /// True if `entity` holds the role, directly or through an any-entity grant.
    pub fn allows(&self, entity: &str) -> bool {
        self.allowed_entities.contains(entity) || self.allowed_entities.contains(ANY_ENTITY)
    }
}

/// target -> role -> record. Replaced wholesale, never patched in place by readers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionState {
    pub targets: BTreeMap<String, BTreeMap<String, PermissionRecord>>,
}

impl PermissionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn record(&self, target: &str, role: &str) -> Option<&PermissionRecord> {
        self.targets.get(target).and_then(|roles| roles.get(role))
    }

    pub(crate) fn record_mut(&mut self, target: &str, role: &str) -> &mut PermissionRecord {
        self.targets
            .entry(target.to_string())
            .or_default()
            .entry(role.to_string())
            .or_default()
    }

    /// Holders of (target, role) in enumeration order. Empty if unknown.
    pub fn allowed_entities(&self, target: &str, role: &str) -> Vec<&str> {
        self.record(target, role)
            .map(|r| r.allowed_entities.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn manager_of(&self, target: &str, role: &str) -> Option<&str> {
        self.record(target, role).and_then(|r| r.manager.as_deref())
    }

    pub fn is_allowed(&self, target: &str, role: &str, entity: &str) -> bool {
        self.record(target, role).is_some_and(|r| r.allows(entity))
    }

    /// Every (target, role) pair `entity` is explicitly listed on, sorted.
    pub fn permissions_of(&self, entity: &str) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        for (target, roles) in &self.targets {
            for (role, record) in roles {
                if record.allowed_entities.contains(entity) {
                    out.push((target.as_str(), role.as_str()));
                }
            }
        }
        out
    }
}

// ── Entities ───────────────────────────────────────────────────────

/// How an entity can be invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// Plain app: only ever the innermost call of a plan.
    #[default]
    DirectCall,
    /// Can relay a call script on behalf of a sender, subject to its own rules.
    ForwardingCall,
}

/// One callable method of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    /// Full signature, e.g. `increment(uint256)`.
    pub signature: String,
    /// Roles guarding the method; the first one is the one intents require.
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl MethodDescriptor {
    /// Number of parameters declared by the signature.
    pub fn arity(&self) -> usize {
        let Some(open) = self.signature.find('(') else {
            return 0;
        };
        let close = self.signature.rfind(')').unwrap_or(self.signature.len());
        if close <= open + 1 {
            return 0;
        }
        let params = &self.signature[open + 1..close];
        if params.trim().is_empty() {
            return 0;
        }
        // Commas inside tuple types do not separate parameters.
        let mut depth = 0usize;
        let mut count = 1;
        for c in params.chars() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => count += 1,
                _ => {}
            }
        }
        count
    }
}

/// ABI-like method table of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub methods: Vec<MethodDescriptor>,
}

impl CapabilityDescriptor {
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// The method able to encode `payload`: same name and same arity.
    pub fn method_for(&self, payload: &CallPayload) -> Option<&MethodDescriptor> {
        self.methods
            .iter()
            .find(|m| m.name == payload.method && m.arity() == payload.args.len())
    }
}

/// A deployed app or proxy, as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub app_id: String,
    pub address: String,
    #[serde(default)]
    pub descriptor: Option<CapabilityDescriptor>,
    #[serde(default)]
    pub kind: CallKind,
    /// Owning kernel (organization root).
    #[serde(default)]
    pub kernel: Option<String>,
}

impl Entity {
    pub fn is_forwarder(&self) -> bool {
        self.kind == CallKind::ForwardingCall
    }
}

// ── Execution Plan ─────────────────────────────────────────────────

/// The action a caller wants performed on the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallPayload {
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl CallPayload {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }
}

/// One call of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionStep {
    pub to: String,
    #[serde(serialize_with = "serialize_hex")]
    pub data: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Wire form of a step for the submission layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub to: String,
    pub data: String,
}

/// Non-empty call chain, outermost (submitted) call first; each later step is
/// nested in the previous one's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExecutionPlan {
    steps: Vec<ExecutionStep>,
}

impl ExecutionPlan {
    pub(crate) fn direct(step: ExecutionStep) -> Self {
        Self { steps: vec![step] }
    }

    pub(crate) fn from_steps(steps: Vec<ExecutionStep>) -> Option<Self> {
        if steps.is_empty() {
            None
        } else {
            Some(Self { steps })
        }
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Plans are never empty; provided for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_direct(&self) -> bool {
        self.steps.len() == 1
    }

    pub fn outermost(&self) -> &ExecutionStep {
        &self.steps[0]
    }

    /// Relaying entities, outermost first. Empty for a direct plan.
    pub fn relays(&self) -> Vec<&str> {
        self.steps[..self.steps.len() - 1]
            .iter()
            .map(|s| s.to.as_str())
            .collect()
    }

    pub fn to_transactions(&self) -> Vec<Transaction> {
        self.steps
            .iter()
            .map(|s| Transaction {
                to: s.to.clone(),
                data: format!("0x{}", hex::encode(&s.data)),
            })
            .collect()
    }
}

fn serialize_hex<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(data)))
}
