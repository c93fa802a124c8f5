#![forbid(unsafe_code)]

/// Canonical state format version. Part of every canonical hash.
pub const STATE_FORMAT_VERSION: u32 = 1;

pub mod address;
pub mod codec;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod hashing;
pub mod invariants;
pub mod registry;
pub mod resolver;
pub mod transitions;

pub use domain::{
    CallKind, CallPayload, CapabilityDescriptor, Entity, ExecutionPlan, ExecutionStep,
    MethodDescriptor, PermissionRecord, PermissionState, Transaction,
};
pub use engine::{ingest, IngestIssue, IngestOutcome, PermissionEngine, StagedBatch};
pub use error::{AclError, OracleError};
pub use events::{EventBatch, LogPosition, ManagerChanged, PermissionChanged};
pub use registry::{EntityRegistry, StaticRegistry};
pub use resolver::{ForwarderOracle, PathResolver};
