//! Failure classification
//!
//! A failure is terminal iff it is, or wraps at any depth, a flow
//! interruption. Everything else is retryable; there is no allow-list and no
//! message matching.

use retryflow_common::ErrorClassification;
use retryflow_domain::{AttemptCompletion, BodyOutcome};
use serde::{Deserialize, Serialize};

/// How a failed attempt is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Consumed locally while attempts remain
    Retryable,
    /// Surfaced immediately regardless of remaining attempts
    Terminal,
}

/// Classify a failure by capability, never by its text
pub fn classify<E>(error: &E) -> FailureClass
where
    E: ErrorClassification + ?Sized,
{
    if error.is_interruption() {
        FailureClass::Terminal
    } else {
        FailureClass::Retryable
    }
}

/// Turn a body outcome into the completion the construct records
pub fn completion_for(outcome: BodyOutcome) -> AttemptCompletion {
    match outcome {
        BodyOutcome::Succeeded { output } => AttemptCompletion::Succeeded { output },
        BodyOutcome::Failed { error } => match classify(&error) {
            FailureClass::Retryable => AttemptCompletion::Retryable(error),
            FailureClass::Terminal => AttemptCompletion::Terminal(error),
        },
    }
}
