//! Store error types

use std::path::PathBuf;

use retryflow_common::{impl_error_classification, CommonError, ErrorSeverity};
use retryflow_domain::{ConstructId, RetryFlowError};
use thiserror::Error;

use crate::errors::InfraError;

/// Failures raised by the durable construct stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("construct {0} already exists")]
    AlreadyExists(ConstructId),

    #[error("construct {0} not found")]
    Missing(ConstructId),

    #[error("revision conflict for construct {id}: expected {expected}, found {found}")]
    RevisionConflict { id: ConstructId, expected: u64, found: u64 },

    #[error("checksum mismatch in {}", path.display())]
    ChecksumMismatch { path: PathBuf },

    #[error("unsupported store format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Pool(#[from] r2d2::Error),

    #[error(transparent)]
    Common(#[from] CommonError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Common(CommonError::persistence_op("io", err.to_string()))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Common(err.into())
    }
}

impl_error_classification!(StoreError, Common,
    Self::AlreadyExists(_) | Self::Missing(_) | Self::RevisionConflict { .. } => {
        interruption: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::ChecksumMismatch { .. } | Self::UnsupportedVersion { .. } => {
        interruption: false,
        severity: ErrorSeverity::Critical,
        critical: true,
    },
    Self::Sqlite(_) | Self::Pool(_) => {
        interruption: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
);

impl From<StoreError> for RetryFlowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(_) | StoreError::RevisionConflict { .. } => {
                Self::Conflict(err.to_string())
            }
            StoreError::Missing(_) => Self::NotFound(err.to_string()),
            StoreError::ChecksumMismatch { .. } | StoreError::UnsupportedVersion { .. } => {
                Self::Storage(err.to_string())
            }
            StoreError::Sqlite(e) => InfraError::from(e).into(),
            StoreError::Pool(e) => InfraError::from(e).into(),
            StoreError::Common(e) => e.into(),
        }
    }
}
