/// Organization ACL Kernel: Transition Logic
///
/// ALL permission-state mutation lives here. Each channel is folded in
/// delivery order over an owned accumulator; nothing outside this module
/// writes to a PermissionState.

use std::collections::BTreeMap;

use crate::address::ZERO_ADDRESS;
use crate::domain::PermissionState;
use crate::engine::IngestIssue;
use crate::events::{LogPosition, ManagerChanged, PermissionChanged};

/// Result of a full replay: the state plus any tie-breaks taken.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldOutcome {
    pub state: PermissionState,
    pub issues: Vec<IngestIssue>,
}

/// Rebuild a state from scratch. Channels are independent, so their relative
/// interleaving does not matter; only the order within each channel does.
pub fn fold(permission: &[PermissionChanged], manager: &[ManagerChanged]) -> FoldOutcome {
    let state = permission
        .iter()
        .fold(PermissionState::new(), apply_permission);

    let mut issues = Vec::new();
    let mut last_seen: BTreeMap<(&str, &str), (LogPosition, &str)> = BTreeMap::new();
    let state = manager.iter().fold(state, |state, event| {
        if let Some(position) = event.position {
            let key = (event.target.as_str(), event.role.as_str());
            if let Some((prev_position, prev_manager)) = last_seen.get(&key) {
                if *prev_position == position && *prev_manager != event.manager {
                    issues.push(IngestIssue::AmbiguousManager {
                        target: event.target.clone(),
                        role: event.role.clone(),
                        position,
                        chosen: event.manager.clone(),
                    });
                }
            }
            last_seen.insert(key, (position, event.manager.as_str()));
        }
        apply_manager(state, event)
    });

    FoldOutcome { state, issues }
}

/// Last write wins per (target, role, entity). A revoke keeps the record,
/// even if it leaves no holders.
pub fn apply_permission(mut state: PermissionState, event: &PermissionChanged) -> PermissionState {
    let record = state.record_mut(&event.target, &event.role);
    if event.allowed {
        // IndexSet::insert keeps the original slot for an existing entity.
        record.allowed_entities.insert(event.entity.clone());
    } else {
        record.allowed_entities.shift_remove(&event.entity);
    }
    state
}

/// Last write wins per (target, role). The zero address unsets the manager.
pub fn apply_manager(mut state: PermissionState, event: &ManagerChanged) -> PermissionState {
    let record = state.record_mut(&event.target, &event.role);
    record.manager = if event.manager == ZERO_ADDRESS {
        None
    } else {
        Some(event.manager.clone())
    };
    state
}
