/// Organization ACL Kernel: Permission State Engine
///
/// Keeps the validated event log of both channels and rebuilds the state by
/// full replay. Positioned events are kept sorted by `LogPosition` and stored
/// once per position, so re-delivered or out-of-order records never reorder
/// history. Events without a position keep their delivery order.
///
/// Malformed records are skipped one by one and reported; they never abort
/// the rest of the batch.

use serde_json::Value;

use crate::domain::PermissionState;
use crate::error::AclError;
use crate::events::{EventBatch, LogPosition, ManagerChanged, PermissionChanged};
use crate::invariants::try_validate_invariants;
use crate::transitions::fold;

/// Something the engine absorbed instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestIssue {
    /// The record was skipped. Always holds `AclError::MalformedEvent`.
    Malformed(AclError),
    /// Two different managers were logged for one pair at the same position.
    /// The last applied one (`chosen`) wins.
    AmbiguousManager {
        target: String,
        role: String,
        position: LogPosition,
        chosen: String,
    },
}

/// Outcome of one ingest call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub state: PermissionState,
    /// Records from this batch that changed the retained log.
    pub accepted: usize,
    /// Issues raised by this batch only.
    pub issues: Vec<IngestIssue>,
}

/// Merge result of one batch, before replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedBatch {
    pub accepted: usize,
    pub duplicates: usize,
    pub issues: Vec<IngestIssue>,
}

/// Stateful engine wrapping the pure fold.
#[derive(Debug, Clone, Default)]
pub struct PermissionEngine {
    permission_log: Vec<PermissionChanged>,
    manager_log: Vec<ManagerChanged>,
    state: PermissionState,
}

impl PermissionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest replayed state.
    pub fn state(&self) -> &PermissionState {
        &self.state
    }

    /// Number of distinct valid events retained across both channels.
    pub fn event_count(&self) -> usize {
        self.permission_log.len() + self.manager_log.len()
    }

    pub fn ingest_batch(&mut self, batch: &EventBatch) -> IngestOutcome {
        self.ingest(&batch.permission, &batch.manager)
    }

    /// Parse, merge and replay.
    pub fn ingest(&mut self, permission: &[Value], manager: &[Value]) -> IngestOutcome {
        let staged = self.stage(permission, manager);
        self.replay();
        IngestOutcome {
            state: self.state.clone(),
            accepted: staged.accepted,
            issues: staged.issues,
        }
    }

    /// Merge already-validated events and replay.
    pub fn ingest_events(
        &mut self,
        permission: Vec<PermissionChanged>,
        manager: Vec<ManagerChanged>,
    ) -> IngestOutcome {
        let mut staged = StagedBatch::default();
        self.merge_events(permission, manager, &mut staged);
        self.replay();
        IngestOutcome {
            state: self.state.clone(),
            accepted: staged.accepted,
            issues: staged.issues,
        }
    }

    /// Parse and merge one batch without replaying. Malformed indices refer
    /// to this batch. Call `replay` once after staging a burst.
    pub fn stage(&mut self, permission: &[Value], manager: &[Value]) -> StagedBatch {
        let mut staged = StagedBatch::default();
        let permission = parse_channel(permission, PermissionChanged::from_value, &mut staged);
        let manager = parse_channel(manager, ManagerChanged::from_value, &mut staged);
        self.merge_events(permission, manager, &mut staged);
        staged
    }

    pub fn stage_batch(&mut self, batch: &EventBatch) -> StagedBatch {
        self.stage(&batch.permission, &batch.manager)
    }

    /// Event-sourced reconstruction from the retained log.
    pub fn replay(&mut self) -> &PermissionState {
        let outcome = fold(&self.permission_log, &self.manager_log);
        if let Err(violation) = try_validate_invariants(&outcome.state) {
            log::error!("replayed permission state violates invariant: {}", violation);
        }
        self.state = outcome.state;
        &self.state
    }

    fn merge_events(
        &mut self,
        permission: Vec<PermissionChanged>,
        manager: Vec<ManagerChanged>,
        staged: &mut StagedBatch,
    ) {
        for event in permission {
            match merge(&mut self.permission_log, event) {
                Merge::Added => staged.accepted += 1,
                Merge::Duplicate => staged.duplicates += 1,
                Merge::Replaced { previous, current } => {
                    staged.accepted += 1;
                    log::warn!(
                        "conflicting permission records for {}/{} at {:?}: keeping last delivered",
                        previous.target,
                        previous.role,
                        current.position
                    );
                }
            }
        }
        for event in manager {
            match merge(&mut self.manager_log, event) {
                Merge::Added => staged.accepted += 1,
                Merge::Duplicate => staged.duplicates += 1,
                Merge::Replaced { previous, current } => {
                    staged.accepted += 1;
                    let Some(position) = current.position else {
                        continue;
                    };
                    if previous.target == current.target && previous.role == current.role {
                        log::warn!(
                            "ambiguous manager for {}/{} at block {} log {}: keeping last applied {}",
                            current.target,
                            current.role,
                            position.block_number,
                            position.log_index,
                            current.manager
                        );
                        staged.issues.push(IngestIssue::AmbiguousManager {
                            target: current.target,
                            role: current.role,
                            position,
                            chosen: current.manager,
                        });
                    } else {
                        log::warn!(
                            "conflicting manager records at block {} log {}: keeping last delivered",
                            position.block_number,
                            position.log_index
                        );
                    }
                }
            }
        }
        if staged.duplicates > 0 {
            log::debug!("ignored {} re-delivered events", staged.duplicates);
        }
    }
}

/// One-shot fold of a complete event history into a state.
pub fn ingest(permission: &[Value], manager: &[Value]) -> IngestOutcome {
    PermissionEngine::new().ingest(permission, manager)
}

trait Positioned: PartialEq + Clone {
    fn log_position(&self) -> Option<LogPosition>;
}

impl Positioned for PermissionChanged {
    fn log_position(&self) -> Option<LogPosition> {
        self.position
    }
}

impl Positioned for ManagerChanged {
    fn log_position(&self) -> Option<LogPosition> {
        self.position
    }
}

enum Merge<T> {
    Added,
    Duplicate,
    /// A different record already held this position; the new one took it.
    Replaced { previous: T, current: T },
}

/// Insert `event` into a channel log. A position is stored once; unpositioned
/// events are appended in delivery order.
fn merge<T: Positioned>(log: &mut Vec<T>, event: T) -> Merge<T> {
    let Some(position) = event.log_position() else {
        log.push(event);
        return Merge::Added;
    };
    if let Some(slot) = log.iter().position(|e| e.log_position() == Some(position)) {
        if log[slot] == event {
            return Merge::Duplicate;
        }
        let current = event.clone();
        let previous = std::mem::replace(&mut log[slot], event);
        return Merge::Replaced { previous, current };
    }
    let at = log
        .iter()
        .position(|e| e.log_position().is_some_and(|p| p > position))
        .unwrap_or(log.len());
    log.insert(at, event);
    Merge::Added
}

fn parse_channel<T>(
    records: &[Value],
    parse: fn(&Value, usize) -> Result<T, AclError>,
    staged: &mut StagedBatch,
) -> Vec<T> {
    let mut parsed = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match parse(record, index) {
            Ok(event) => parsed.push(event),
            Err(err) => {
                log::warn!("skipping event: {}", err);
                staged.issues.push(IngestIssue::Malformed(err));
            }
        }
    }
    parsed
}
