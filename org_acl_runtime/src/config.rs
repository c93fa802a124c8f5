//! Runtime configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides. `{}` is a valid config.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use org_acl_kernel::resolver::DEFAULT_MAX_PATH_LENGTH;

use crate::error::{Result, RuntimeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Quiet period that closes a burst of ingested batches.
    pub debounce_ms: u64,
    /// Budget for a single forwarder "can forward" check.
    pub forward_check_timeout_ms: u64,
    /// Longest execution plan, direct call included.
    pub max_path_length: usize,
    /// Pending ingest requests before `ingest` waits.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            forward_check_timeout_ms: 5_000,
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
            queue_capacity: 256,
        }
    }
}

impl RuntimeConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| RuntimeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| RuntimeError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_path_length == 0 {
            return Err(RuntimeError::Config(
                "max_path_length must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(RuntimeError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn forward_check_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_check_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"debounce_ms": 50}}"#).unwrap();
        let config = RuntimeConfig::load(file.path()).unwrap();
        assert_eq!(config.debounce(), Duration::from_millis(50));
        assert_eq!(config.max_path_length, DEFAULT_MAX_PATH_LENGTH);
        assert_eq!(config.queue_capacity, 256);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"debounce": 50}}"#).unwrap();
        assert!(matches!(
            RuntimeConfig::load(file.path()),
            Err(RuntimeError::Config(_))
        ));
    }

    #[test]
    fn zero_path_length_is_rejected() {
        let config = RuntimeConfig {
            max_path_length: 0,
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RuntimeConfig::load(Path::new("/nonexistent/acl.json")).unwrap_err();
        assert!(matches!(err, RuntimeError::Io { .. }));
    }
}
