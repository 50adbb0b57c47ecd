//! Dispatcher error types

use std::time::Duration;

use retryflow_domain::RetryFlowError;
use thiserror::Error;

use crate::errors::InfraError;

/// Resume dispatcher errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Dispatcher is already running
    #[error("Dispatcher already running")]
    AlreadyRunning,

    /// Dispatcher is not running
    #[error("Dispatcher not running")]
    NotRunning,

    /// Background task did not stop in time
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        duration: Duration,
        #[source]
        source: tokio::time::error::Elapsed,
    },

    /// Background task panicked or was aborted
    #[error("Task join failed: {0}")]
    TaskJoinFailed(#[from] tokio::task::JoinError),

    /// The event queue has no receiver
    #[error("Resume channel closed")]
    ChannelClosed,
}

impl From<DispatcherError> for InfraError {
    fn from(err: DispatcherError) -> Self {
        let flow_err = match err {
            DispatcherError::AlreadyRunning
            | DispatcherError::NotRunning
            | DispatcherError::ChannelClosed => RetryFlowError::InvalidInput(err.to_string()),
            _ => RetryFlowError::Internal(err.to_string()),
        };
        InfraError(flow_err)
    }
}

impl From<DispatcherError> for RetryFlowError {
    fn from(err: DispatcherError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for dispatcher operations
pub type DispatcherResult<T> = Result<T, DispatcherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_errors_map_to_invalid_input() {
        let err: RetryFlowError = DispatcherError::AlreadyRunning.into();
        assert!(matches!(err, RetryFlowError::InvalidInput(_)));

        let err: RetryFlowError = DispatcherError::ChannelClosed.into();
        assert!(matches!(err, RetryFlowError::InvalidInput(_)));
    }
}
