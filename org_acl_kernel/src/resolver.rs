/// Organization ACL Kernel: Transaction Path Resolver
///
/// Decides how a sender can get a call executed on a target:
///   1. addresses are well-formed, else `InvalidAddress`
///   2. the target can encode the call, else `MissingDescriptor`
///   3. sender holds the role: one direct step
///   4. otherwise breadth-first search over forwarders for the shortest relay
///      chain, ties broken by registry order
///   5. nothing found: `NoPermission`
///
/// Edge validity is never static. A hop exists only if the forwarder says so
/// through the `ForwarderOracle` for the exact script it would relay.
/// Resolution reads the state and never mutates it.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::address::{normalize, validate_address};
use crate::codec::{encode_call, forward_step};
use crate::domain::{
    CallPayload, Entity, ExecutionPlan, ExecutionStep, MethodDescriptor, PermissionState,
};
use crate::error::{AclError, OracleError};
use crate::registry::EntityRegistry;

/// Longest plan produced by default, direct call included.
pub const DEFAULT_MAX_PATH_LENGTH: usize = 5;

/// External "can this forwarder relay `script` for `sender`" check.
#[async_trait]
pub trait ForwarderOracle: Send + Sync {
    async fn can_forward(
        &self,
        forwarder: &Entity,
        sender: &str,
        script: &[u8],
    ) -> Result<bool, OracleError>;
}

pub struct PathResolver {
    registry: Arc<dyn EntityRegistry>,
    oracle: Arc<dyn ForwarderOracle>,
    max_path_length: usize,
}

/// A partial relay chain waiting to be extended outward.
struct Frontier {
    steps: Vec<ExecutionStep>,
    head: Entity,
    head_script: Vec<u8>,
    visited: Vec<String>,
}

/// Validated request, with the innermost call already encoded.
struct Prepared {
    sender: String,
    target: String,
    direct: ExecutionStep,
}

impl PathResolver {
    pub fn new(registry: Arc<dyn EntityRegistry>, oracle: Arc<dyn ForwarderOracle>) -> Self {
        Self {
            registry,
            oracle,
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
        }
    }

    pub fn with_max_path_length(mut self, max_path_length: usize) -> Self {
        self.max_path_length = max_path_length.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<dyn EntityRegistry> {
        &self.registry
    }

    /// Plan for `sender` to perform `payload` on `target`, guarded by `role`.
    pub async fn resolve(
        &self,
        state: &PermissionState,
        sender: &str,
        target: &str,
        role: &str,
        payload: &CallPayload,
    ) -> Result<ExecutionPlan, AclError> {
        let prepared = self.prepare(sender, target, payload)?;
        self.find_path(state, prepared, &normalize(role)).await
    }

    /// Like `resolve`, with the role taken from the method's descriptor.
    /// A method guarded by no role is callable by anyone.
    pub async fn resolve_intent(
        &self,
        state: &PermissionState,
        sender: &str,
        target: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<ExecutionPlan, AclError> {
        let payload = CallPayload::new(method, args);
        let prepared = self.prepare(sender, target, &payload)?;
        let role = self
            .method_for(&prepared.target, &payload)?
            .roles
            .first()
            .map(|role| normalize(role));
        match role {
            Some(role) => self.find_path(state, prepared, &role).await,
            None => Ok(ExecutionPlan::direct(prepared.direct)),
        }
    }

    fn prepare(
        &self,
        sender: &str,
        target: &str,
        payload: &CallPayload,
    ) -> Result<Prepared, AclError> {
        let sender = validate_address(sender)?;
        let target = validate_address(target)?;
        let method = self.method_for(&target, payload)?;
        let app_id = self
            .registry
            .entity(&target)
            .map(|e| e.app_id)
            .unwrap_or_else(|| target.clone());
        let direct = ExecutionStep {
            to: target.clone(),
            data: encode_call(&method, &payload.args),
            description: Some(
                method
                    .notice
                    .clone()
                    .unwrap_or_else(|| format!("{} on {}", method.signature, app_id)),
            ),
        };
        Ok(Prepared {
            sender,
            target,
            direct,
        })
    }

    fn method_for(&self, target: &str, payload: &CallPayload) -> Result<MethodDescriptor, AclError> {
        self.registry
            .capability_descriptor(target)
            .and_then(|d| d.method_for(payload).cloned())
            .ok_or_else(|| AclError::MissingDescriptor {
                target: target.to_string(),
                method: payload.method.clone(),
            })
    }

    async fn find_path(
        &self,
        state: &PermissionState,
        prepared: Prepared,
        role: &str,
    ) -> Result<ExecutionPlan, AclError> {
        let Prepared {
            sender,
            target,
            direct,
        } = prepared;
        let no_permission = || AclError::NoPermission {
            sender: sender.clone(),
            target: target.clone(),
            role: role.to_string(),
        };

        let Some(record) = state.record(&target, role) else {
            return Err(no_permission());
        };
        if record.allows(&sender) {
            return Ok(ExecutionPlan::direct(direct));
        }
        if self.max_path_length < 2 {
            return Err(no_permission());
        }

        let forwarders: Vec<Entity> = self
            .registry
            .forwarders()
            .into_iter()
            .filter_map(|mut f| match validate_address(&f.address) {
                Ok(address) if address != target => {
                    f.address = address;
                    Some(f)
                }
                Ok(_) => None,
                Err(err) => {
                    log::warn!("ignoring forwarder {}: {}", f.app_id, err);
                    None
                }
            })
            .collect();

        // Depth one: forwarders holding the role themselves.
        let mut queue = VecDeque::new();
        for forwarder in forwarders.iter().filter(|f| record.allows(&f.address)) {
            let (step, script) = forward_step(forwarder, &direct)?;
            if self.check_forward(forwarder, &sender, &script).await {
                log::debug!("direct relay through {}", forwarder.app_id);
                return ExecutionPlan::from_steps(vec![step, direct]).ok_or_else(no_permission);
            }
            queue.push_back(Frontier {
                steps: vec![step, direct.clone()],
                head: forwarder.clone(),
                head_script: script,
                visited: vec![forwarder.address.clone()],
            });
        }

        // Deeper: an outer forwarder fronts the current head. Candidates are
        // checked as they are generated, so the first hit is a shortest chain.
        while let Some(node) = queue.pop_front() {
            if node.steps.len() >= self.max_path_length {
                continue;
            }
            for outer in &forwarders {
                if node.visited.contains(&outer.address) {
                    continue;
                }
                if !self.check_forward(&node.head, &outer.address, &node.head_script).await {
                    continue;
                }
                let (step, script) = forward_step(outer, &node.steps[0])?;
                let mut steps = Vec::with_capacity(node.steps.len() + 1);
                steps.push(step);
                steps.extend(node.steps.iter().cloned());

                if self.check_forward(outer, &sender, &script).await {
                    log::debug!(
                        "relay chain of {} steps found through {}",
                        steps.len(),
                        outer.app_id
                    );
                    return ExecutionPlan::from_steps(steps).ok_or_else(no_permission);
                }
                let mut visited = node.visited.clone();
                visited.push(outer.address.clone());
                queue.push_back(Frontier {
                    steps,
                    head: outer.clone(),
                    head_script: script,
                    visited,
                });
            }
        }

        Err(no_permission())
    }

    /// An oracle failure refuses this hop only.
    async fn check_forward(&self, forwarder: &Entity, sender: &str, script: &[u8]) -> bool {
        match self.oracle.can_forward(forwarder, sender, script).await {
            Ok(accepted) => accepted,
            Err(err) => {
                log::warn!(
                    "forwarder {} check for {} failed, treating as refusal: {}",
                    forwarder.app_id,
                    sender,
                    err
                );
                false
            }
        }
    }
}
