//! Configuration structures
//!
//! Loaded by `retryflow_infra::config` from environment variables or a
//! TOML/JSON file. Every section has defaults so partial files are valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_LOG_LEVEL, DEFAULT_MAX_ATTEMPTS};
use crate::errors::{Result, RetryFlowError};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryFlowConfig {
    pub store: StoreConfig,
    pub retry: RetryDefaults,
    pub logging: LoggingConfig,
}

impl RetryFlowConfig {
    /// Check cross-field constraints after loading
    ///
    /// # Errors
    /// Returns `RetryFlowError::Config` when the attempt limit is zero or a
    /// durable backend has no path.
    pub fn validate(&self) -> Result<()> {
        validate_max_attempts(self.retry.default_max_attempts)?;

        match self.store.backend {
            StoreBackend::Memory => Ok(()),
            StoreBackend::File | StoreBackend::Sqlite if self.store.path.is_none() => {
                Err(RetryFlowError::Config(format!(
                    "store.path is required for the '{}' backend",
                    self.store.backend
                )))
            }
            StoreBackend::File | StoreBackend::Sqlite => Ok(()),
        }
    }
}

/// Where construct records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map; state is lost when the process exits
    #[default]
    Memory,
    /// One JSON file per construct in a directory
    File,
    /// SQLite database file
    Sqlite,
}

crate::impl_domain_status_conversions!(StoreBackend {
    Memory => "memory",
    File => "file",
    Sqlite => "sqlite",
});

/// Construct store settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory for the file backend, database file for SQLite
    pub path: Option<PathBuf>,
}

/// Defaults applied when a caller does not pass an attempt limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryDefaults {
    pub default_max_attempts: u32,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self { default_max_attempts: DEFAULT_MAX_ATTEMPTS }
    }
}

/// Tracing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: DEFAULT_LOG_LEVEL.to_string(), json: false }
    }
}

/// Reject attempt limits below one
///
/// # Errors
/// Returns `RetryFlowError::Config` for zero.
pub fn validate_max_attempts(max_attempts: u32) -> Result<()> {
    if max_attempts < 1 {
        return Err(RetryFlowError::Config(format!(
            "max_attempts must be a positive integer, got {max_attempts}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RetryFlowConfig::default();
        assert_eq!(config.retry.default_max_attempts, 3);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = RetryFlowConfig::default();
        config.retry.default_max_attempts = 0;
        assert!(matches!(config.validate(), Err(RetryFlowError::Config(_))));
    }

    #[test]
    fn test_durable_backend_requires_path() {
        let mut config = RetryFlowConfig::default();
        config.store.backend = StoreBackend::Sqlite;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sqlite"));

        config.store.path = Some(PathBuf::from("/tmp/retryflow.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: RetryFlowConfig =
            serde_json::from_str(r#"{ "store": { "backend": "file", "path": "/var/lib/rf" } }"#)
                .unwrap();
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.retry.default_max_attempts, 3);
    }
}
