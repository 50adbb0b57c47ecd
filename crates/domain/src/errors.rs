//! Error types used throughout the workspace

use retryflow_common::{CommonError, ErrorClassification, ErrorSeverity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Retryflow operations
///
/// These are failures of the retry machinery itself. Failures of the body
/// being retried are [`crate::StepError`] values and are never folded into
/// this type.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum RetryFlowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Stale resume: {0}")]
    StaleResume(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invoker error: {0}")]
    Invoker(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Retryflow operations
pub type Result<T> = std::result::Result<T, RetryFlowError>;

impl From<CommonError> for RetryFlowError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Config { .. } => Self::Config(err.to_string()),
            CommonError::Serialization { .. } => Self::Serialization(err.to_string()),
            CommonError::Persistence { .. } => Self::Storage(err.to_string()),
            CommonError::NotFound { .. } => Self::NotFound(err.to_string()),
            CommonError::Timeout { .. } | CommonError::TaskCancelled { .. } => {
                Self::Invoker(err.to_string())
            }
            CommonError::Internal { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RetryFlowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl ErrorClassification for RetryFlowError {
    fn is_interruption(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound(_) => ErrorSeverity::Info,
            Self::StaleResume(_) | Self::Conflict(_) => ErrorSeverity::Warning,
            Self::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

impl RetryFlowError {
    /// Stable label suitable for structured log fields
    pub fn label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::NotFound(_) => "not_found",
            Self::StaleResume(_) => "stale_resume",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
            Self::Invoker(_) => "invoker",
            Self::Internal(_) => "internal",
        }
    }
}
