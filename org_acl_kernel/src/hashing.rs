/// Organization ACL Kernel: Canonical Hashing
///
/// Deterministic canonical serialization + SHA-256 hashing.
///
/// Rules:
///   - Targets sorted by id, roles sorted by name (UTF-8 byte order)
///   - allowedEntities kept in enumeration order (order is observable)
///   - manager omitted when unset
///   - UTF-8 JSON, no whitespace

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::PermissionState;
use crate::STATE_FORMAT_VERSION;

/// Canonical serialization of a PermissionState to UTF-8 JSON bytes.
pub fn canonical_serialize(state: &PermissionState) -> Vec<u8> {
    // Value's Display is infallible and compact.
    build_canonical_value(state).to_string().into_bytes()
}

/// SHA-256 of the canonical serialization. Lowercase hex string.
pub fn canonical_hash(state: &PermissionState) -> String {
    hex::encode(Sha256::digest(canonical_serialize(state)))
}

/// Field order: format_version, permissions.
fn build_canonical_value(state: &PermissionState) -> Value {
    let mut targets = Map::new();
    // BTreeMap iteration is already sorted.
    for (target, roles) in &state.targets {
        let mut role_map = Map::new();
        for (role, record) in roles {
            let mut record_map = Map::new();
            record_map.insert(
                "allowedEntities".to_string(),
                Value::Array(
                    record
                        .allowed_entities
                        .iter()
                        .cloned()
                        .map(Value::String)
                        .collect(),
                ),
            );
            if let Some(manager) = &record.manager {
                record_map.insert("manager".to_string(), Value::String(manager.clone()));
            }
            role_map.insert(role.clone(), Value::Object(record_map));
        }
        targets.insert(target.clone(), Value::Object(role_map));
    }

    let mut root = Map::new();
    root.insert(
        "format_version".to_string(),
        Value::Number(STATE_FORMAT_VERSION.into()),
    );
    root.insert("permissions".to_string(), Value::Object(targets));
    Value::Object(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PermissionChanged;
    use crate::transitions::fold;

    #[test]
    fn serialization_is_compact_and_ordered() {
        let out = fold(
            &[
                PermissionChanged::new("b", "r", "x", true),
                PermissionChanged::new("a", "r", "y", true),
            ],
            &[],
        );
        let json = String::from_utf8(canonical_serialize(&out.state)).unwrap();
        assert_eq!(
            json,
            r#"{"format_version":1,"permissions":{"a":{"r":{"allowedEntities":["y"]}},"b":{"r":{"allowedEntities":["x"]}}}}"#
        );
    }

    #[test]
    fn hash_tracks_enumeration_order() {
        let ab = fold(
            &[
                PermissionChanged::new("c", "r", "a", true),
                PermissionChanged::new("c", "r", "b", true),
            ],
            &[],
        );
        let ba = fold(
            &[
                PermissionChanged::new("c", "r", "b", true),
                PermissionChanged::new("c", "r", "a", true),
            ],
            &[],
        );
        assert_ne!(canonical_hash(&ab.state), canonical_hash(&ba.state));
        assert_eq!(canonical_hash(&ab.state).len(), 64);
    }
}
