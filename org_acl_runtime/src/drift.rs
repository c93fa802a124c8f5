//! Drift detection: what changed between two permission states.

use std::collections::BTreeSet;

use org_acl_kernel::PermissionState;

/// One (target, role, entity) holding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Holding {
    pub target: String,
    pub role: String,
    pub entity: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerChange {
    pub target: String,
    pub role: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Structured difference between two states. Enumeration-order changes alone
/// produce an empty report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    pub granted: Vec<Holding>,
    pub revoked: Vec<Holding>,
    pub manager_changes: Vec<ManagerChange>,
}

impl DriftReport {
    pub fn is_empty(&self) -> bool {
        self.granted.is_empty() && self.revoked.is_empty() && self.manager_changes.is_empty()
    }
}

pub fn compare_states(state_a: &PermissionState, state_b: &PermissionState) -> DriftReport {
    let holdings_a = holdings(state_a);
    let holdings_b = holdings(state_b);

    let granted = holdings_b.difference(&holdings_a).cloned().collect();
    let revoked = holdings_a.difference(&holdings_b).cloned().collect();

    let mut pairs: BTreeSet<(&str, &str)> = BTreeSet::new();
    for state in [state_a, state_b] {
        for (target, roles) in &state.targets {
            for role in roles.keys() {
                pairs.insert((target.as_str(), role.as_str()));
            }
        }
    }
    let manager_changes = pairs
        .into_iter()
        .filter_map(|(target, role)| {
            let from = state_a.manager_of(target, role);
            let to = state_b.manager_of(target, role);
            (from != to).then(|| ManagerChange {
                target: target.to_string(),
                role: role.to_string(),
                from: from.map(str::to_string),
                to: to.map(str::to_string),
            })
        })
        .collect();

    DriftReport {
        granted,
        revoked,
        manager_changes,
    }
}

fn holdings(state: &PermissionState) -> BTreeSet<Holding> {
    let mut out = BTreeSet::new();
    for (target, roles) in &state.targets {
        for (role, record) in roles {
            for entity in &record.allowed_entities {
                out.insert(Holding {
                    target: target.clone(),
                    role: role.clone(),
                    entity: entity.clone(),
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use org_acl_kernel::transitions::fold;
    use org_acl_kernel::{ManagerChanged, PermissionChanged};

    #[test]
    fn reports_grants_revokes_and_managers() {
        let before = fold(
            &[
                PermissionChanged::new("c", "add", "a", true),
                PermissionChanged::new("c", "add", "b", true),
            ],
            &[],
        )
        .state;
        let after = fold(
            &[
                PermissionChanged::new("c", "add", "a", true),
                PermissionChanged::new("c", "sub", "b", true),
            ],
            &[ManagerChanged::new("c", "add", "m")],
        )
        .state;

        let report = compare_states(&before, &after);
        assert_eq!(report.granted.len(), 1);
        assert_eq!(report.granted[0].role, "sub");
        assert_eq!(report.revoked.len(), 1);
        assert_eq!(report.revoked[0].entity, "b");
        assert_eq!(
            report.manager_changes,
            vec![ManagerChange {
                target: "c".into(),
                role: "add".into(),
                from: None,
                to: Some("m".into()),
            }]
        );
    }

    #[test]
    fn reorder_only_is_empty() {
        let ab = fold(
            &[
                PermissionChanged::new("c", "r", "a", true),
                PermissionChanged::new("c", "r", "b", true),
            ],
            &[],
        )
        .state;
        let ba = fold(
            &[
                PermissionChanged::new("c", "r", "b", true),
                PermissionChanged::new("c", "r", "a", true),
            ],
            &[],
        )
        .state;
        assert!(compare_states(&ab, &ba).is_empty());
    }
}
