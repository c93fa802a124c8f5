/// Organization ACL Kernel: Invariant Checks
///
/// Structural checks over a replayed state. Returns `Err(message)` on the
/// first failure, `Ok(())` if all pass.

use crate::address::ZERO_ADDRESS;
use crate::domain::PermissionState;

pub fn try_validate_invariants(state: &PermissionState) -> Result<(), String> {
    check_keys_non_empty(state)?;
    check_holders_non_empty(state)?;
    check_manager_set(state)?;
    Ok(())
}

/// Every target and role key is non-empty.
fn check_keys_non_empty(state: &PermissionState) -> Result<(), String> {
    for (target, roles) in &state.targets {
        if target.is_empty() {
            return Err("[INVARIANT:target_key] empty target entity".to_string());
        }
        if roles.is_empty() {
            return Err(format!(
                "[INVARIANT:target_key] target {:?} has no roles",
                target
            ));
        }
        if roles.keys().any(|role| role.is_empty()) {
            return Err(format!(
                "[INVARIANT:role_key] target {:?} has an empty role",
                target
            ));
        }
    }
    Ok(())
}

/// No holder is an empty identifier.
fn check_holders_non_empty(state: &PermissionState) -> Result<(), String> {
    for (target, roles) in &state.targets {
        for (role, record) in roles {
            if record.allowed_entities.iter().any(|e| e.is_empty()) {
                return Err(format!(
                    "[INVARIANT:holder] {}/{} lists an empty entity",
                    target, role
                ));
            }
        }
    }
    Ok(())
}

/// A present manager is a real entity, never the unset marker.
fn check_manager_set(state: &PermissionState) -> Result<(), String> {
    for (target, roles) in &state.targets {
        for (role, record) in roles {
            if let Some(manager) = &record.manager {
                if manager.is_empty() || manager == ZERO_ADDRESS {
                    return Err(format!(
                        "[INVARIANT:manager] {}/{} stores unset manager {:?}",
                        target, role, manager
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_state_is_valid() {
        assert!(try_validate_invariants(&PermissionState::new()).is_ok());
    }

    #[test]
    fn zero_manager_is_rejected() {
        let mut state = PermissionState::new();
        state.record_mut("c", "r").manager = Some(ZERO_ADDRESS.to_string());
        let err = try_validate_invariants(&state).unwrap_err();
        assert!(err.starts_with("[INVARIANT:manager]"));
    }

    #[test]
    fn empty_holder_is_rejected() {
        let mut state = PermissionState::new();
        state.record_mut("c", "r").allowed_entities.insert(String::new());
        assert!(try_validate_invariants(&state).is_err());
    }
}
