//! Published snapshots: immutable, versioned views of the permission state.
//!
//! A snapshot carries the canonical hash of its state, so "did anything
//! observable change" is a string comparison.

use serde::Serialize;

use org_acl_kernel::hashing::canonical_hash;
use org_acl_kernel::PermissionState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Publish counter, 0 for the initial empty state.
    pub version: u64,
    /// SHA-256 of the canonical JSON of `state`.
    pub hash: String,
    /// Valid events folded into `state`.
    pub event_count: usize,
    pub state: PermissionState,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::capture(0, 0, PermissionState::new())
    }

    pub fn capture(version: u64, event_count: usize, state: PermissionState) -> Self {
        let hash = canonical_hash(&state);
        Self {
            version,
            hash,
            event_count,
            state,
        }
    }

    /// True if the stored hash still matches the state.
    pub fn verify(&self) -> bool {
        canonical_hash(&self.state) == self.hash
    }
}
