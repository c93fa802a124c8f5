#![forbid(unsafe_code)]

//! Organization ACL Runtime
//!
//! Wraps the ACL kernel with a debounced snapshot feed, cache-backed and
//! time-bounded forwarder checks, an organization session and a
//! request/response bridge.
//!
//! No permission logic lives here: folds, invariants and path search are
//! delegated to the kernel.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod drift;
pub mod error;
pub mod feed;
pub mod oracle;
pub mod replay;
pub mod session;
pub mod snapshot;
pub mod subscription;

pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use session::{Organization, Resolution};
pub use snapshot::Snapshot;
