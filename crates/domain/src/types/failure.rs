//! Step failure taxonomy
//!
//! A body attempt fails with a [`StepError`]. Whether that failure may be
//! retried is decided by looking for a [`FlowInterruption`] anywhere in the
//! error's source chain; the error message is never inspected.

use std::error::Error as StdError;
use std::fmt;

use retryflow_common::{ErrorClassification, ErrorSeverity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why the enclosing run was interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionCause {
    /// A user stopped the run
    UserAbort,
    /// A deadline on the run expired
    Timeout,
    /// An approval the body was waiting on was rejected or withdrawn
    InputRejected,
    /// Any other externally triggered cancellation
    External,
}

crate::impl_domain_status_conversions!(InterruptionCause {
    UserAbort => "user_abort",
    Timeout => "timeout",
    InputRejected => "input_rejected",
    External => "external",
});

/// Interruption marker
///
/// The only error type the failure classifier treats as terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowInterruption {
    pub cause: InterruptionCause,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FlowInterruption {
    pub fn new(cause: InterruptionCause) -> Self {
        Self { cause, actor: None, message: None }
    }

    /// User abort attributed to `actor`
    pub fn aborted_by(actor: impl Into<String>) -> Self {
        Self { cause: InterruptionCause::UserAbort, actor: Some(actor.into()), message: None }
    }

    /// Approval rejected by `actor`
    pub fn rejected_by(actor: impl Into<String>) -> Self {
        Self { cause: InterruptionCause::InputRejected, actor: Some(actor.into()), message: None }
    }

    pub fn timeout() -> Self {
        Self::new(InterruptionCause::Timeout)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self { cause: InterruptionCause::External, actor: None, message: Some(message.into()) }
    }
}

impl fmt::Display for FlowInterruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.cause, &self.actor) {
            (InterruptionCause::UserAbort, Some(actor)) => write!(f, "Aborted by {actor}"),
            (InterruptionCause::UserAbort, None) => f.write_str("Aborted"),
            (InterruptionCause::InputRejected, Some(actor)) => write!(f, "Rejected by {actor}"),
            (InterruptionCause::InputRejected, None) => f.write_str("Rejected"),
            (InterruptionCause::Timeout, _) => f.write_str("Timeout has been exceeded"),
            (InterruptionCause::External, _) => match &self.message {
                Some(message) => write!(f, "Interrupted: {message}"),
                None => f.write_str("Interrupted"),
            },
        }
    }
}

impl StdError for FlowInterruption {}

/// Failure produced by one body attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepError {
    /// Ordinary failure raised by step logic
    #[error("{message}")]
    Execution { message: String },

    /// The enclosing run was interrupted
    #[error("{0}")]
    Interrupted(#[source] FlowInterruption),

    /// Another step error with added context
    #[error("{context}: {source}")]
    Wrapped { context: String, source: Box<StepError> },
}

impl StepError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution { message: message.into() }
    }

    pub fn interrupted(interruption: FlowInterruption) -> Self {
        Self::Interrupted(interruption)
    }

    /// Wrap this error with `context`, keeping it reachable through `source()`
    #[must_use]
    pub fn wrap(self, context: impl Into<String>) -> Self {
        Self::Wrapped { context: context.into(), source: Box::new(self) }
    }

    /// First interruption found in the source chain, if any
    pub fn interruption(&self) -> Option<&FlowInterruption> {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(interruption) = err.downcast_ref::<FlowInterruption>() {
                return Some(interruption);
            }
            current = err.source();
        }
        None
    }
}

impl ErrorClassification for StepError {
    fn is_interruption(&self) -> bool {
        self.interruption().is_some()
    }

    fn severity(&self) -> ErrorSeverity {
        if self.is_interruption() {
            ErrorSeverity::Info
        } else {
            ErrorSeverity::Error
        }
    }

    fn is_critical(&self) -> bool {
        false
    }
}
