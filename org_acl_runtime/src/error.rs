use std::path::PathBuf;

use thiserror::Error;

use org_acl_kernel::AclError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Acl(#[from] AclError),
    #[error("config error: {0}")]
    Config(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("permission feed is closed")]
    FeedClosed,
    #[error("determinism failure: replay produced {first} then {second}")]
    Determinism { first: String, second: String },
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
