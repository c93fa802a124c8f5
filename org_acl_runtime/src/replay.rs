//! Replay orchestrator: rebuild state from a complete event history.
//!
//! Delegates all fold logic to the kernel.

use std::fs;
use std::path::Path;

use org_acl_kernel::engine::ingest;
use org_acl_kernel::hashing::canonical_hash;
use org_acl_kernel::{EventBatch, PermissionState};

use crate::error::{Result, RuntimeError};

/// Rebuild the permission state from `batch` and return it with its
/// canonical hash. Malformed records are skipped (and logged by the kernel).
pub fn rebuild_state(batch: &EventBatch) -> (PermissionState, String) {
    let outcome = ingest(&batch.permission, &batch.manager);
    if !outcome.issues.is_empty() {
        tracing::warn!(issues = outcome.issues.len(), "replay absorbed event issues");
    }
    let hash = canonical_hash(&outcome.state);
    (outcome.state, hash)
}

/// Rebuild state and return only the canonical hash.
pub fn rebuild_hash(batch: &EventBatch) -> String {
    rebuild_state(batch).1
}

/// Replay twice and require identical hashes.
pub fn verify_determinism(batch: &EventBatch) -> Result<String> {
    let first = rebuild_hash(batch);
    let second = rebuild_hash(batch);
    if first != second {
        return Err(RuntimeError::Determinism { first, second });
    }
    Ok(first)
}

/// Load an event history file: `{"permission": [...], "manager": [...]}`.
pub fn load_batch(path: &Path) -> Result<EventBatch> {
    let content = fs::read_to_string(path).map_err(|source| RuntimeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}
