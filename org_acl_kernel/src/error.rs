use thiserror::Error;

/// Failures surfaced by the kernel.
///
/// `MalformedEvent` is absorbed by the engine (the event is skipped and
/// reported); the remaining variants propagate to the caller of `resolve`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    #[error("malformed {channel} event at index {index}: {reason}")]
    MalformedEvent {
        channel: &'static str,
        index: usize,
        reason: String,
    },
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("no permission for {sender} to perform '{role}' on {target}")]
    NoPermission {
        sender: String,
        target: String,
        role: String,
    },
    #[error("missing descriptor for '{method}' on {target}")]
    MissingDescriptor { target: String, method: String },
    #[error("invalid call script: {0}")]
    InvalidScript(String),
}

/// Failure of an external "can forward" check. Always treated as a refusal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("forwarder check timed out after {0} ms")]
    Timeout(u64),
    #[error("forwarder check failed: {0}")]
    Failed(String),
}
