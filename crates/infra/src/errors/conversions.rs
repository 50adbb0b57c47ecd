//! Conversions from external infrastructure errors into domain errors.

use retryflow_domain::RetryFlowError;
use rusqlite::Error as SqlError;
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub RetryFlowError);

impl From<InfraError> for RetryFlowError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<RetryFlowError> for InfraError {
    fn from(value: RetryFlowError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoRetryFlowError {
    fn into_retryflow(self) -> RetryFlowError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → RetryFlowError */
/* -------------------------------------------------------------------------- */

impl IntoRetryFlowError for SqlError {
    fn into_retryflow(self) -> RetryFlowError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        RetryFlowError::Storage("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        RetryFlowError::Storage("database is locked".into())
                    }
                    // SQLITE_CONSTRAINT_PRIMARYKEY / SQLITE_CONSTRAINT_UNIQUE
                    (ErrorCode::ConstraintViolation, 1555 | 2067) => {
                        RetryFlowError::Conflict("construct record already exists".into())
                    }
                    (ErrorCode::NotADatabase, _) => {
                        RetryFlowError::Storage("file is not a database".into())
                    }
                    _ => RetryFlowError::Storage(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => RetryFlowError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                RetryFlowError::Storage(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                RetryFlowError::Storage(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => RetryFlowError::Config(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => RetryFlowError::Storage(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_retryflow())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → RetryFlowError */
/* -------------------------------------------------------------------------- */

impl IntoRetryFlowError for r2d2::Error {
    fn into_retryflow(self) -> RetryFlowError {
        RetryFlowError::Storage(format!("connection pool error: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(value.into_retryflow())
    }
}

/* -------------------------------------------------------------------------- */
/* std::io::Error → RetryFlowError */
/* -------------------------------------------------------------------------- */

impl IntoRetryFlowError for std::io::Error {
    fn into_retryflow(self) -> RetryFlowError {
        use std::io::ErrorKind;

        match self.kind() {
            ErrorKind::NotFound => RetryFlowError::NotFound(self.to_string()),
            ErrorKind::PermissionDenied => {
                RetryFlowError::Storage(format!("permission denied: {self}"))
            }
            _ => RetryFlowError::Storage(format!("I/O error: {self}")),
        }
    }
}

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        InfraError(value.into_retryflow())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json / toml → RetryFlowError */
/* -------------------------------------------------------------------------- */

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(RetryFlowError::Serialization(format!("JSON: {value}")))
    }
}

impl From<toml::de::Error> for InfraError {
    fn from(value: toml::de::Error) -> Self {
        InfraError(RetryFlowError::Config(format!("invalid TOML: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* tokio::task::JoinError → RetryFlowError */
/* -------------------------------------------------------------------------- */

impl From<JoinError> for InfraError {
    fn from(value: JoinError) -> Self {
        let message = if value.is_cancelled() {
            format!("blocking task cancelled: {value}")
        } else {
            format!("blocking task panicked: {value}")
        };
        InfraError(RetryFlowError::Internal(message))
    }
}
