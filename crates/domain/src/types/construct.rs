//! Durable retry construct record
//!
//! `RetryConstruct` is the unit of durability: the attempt counter and the
//! identity of the in-flight attempt live here as plain serializable data, so
//! a construct can be reloaded after a restart and continue from exactly the
//! transition it last persisted.
//!
//! State machine:
//!
//! ```text
//! Starting -> Running(n) -> Running(n+1) | Succeeded | FailedTerminal | FailedAfterExhaustion
//! ```
//!
//! Every mutating method checks its preconditions and returns
//! `RetryFlowError::InvalidTransition` instead of panicking, because records
//! may come back from storage in any state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::validate_max_attempts;
use crate::errors::{Result, RetryFlowError};
use crate::types::body::{BodySpec, ConstructId, ResumeToken};
use crate::types::failure::StepError;

/// Lifecycle phase of a construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructState {
    Starting,
    Running,
    Succeeded,
    FailedTerminal,
    FailedAfterExhaustion,
}

crate::impl_domain_status_conversions!(ConstructState {
    Starting => "starting",
    Running => "running",
    Succeeded => "succeeded",
    FailedTerminal => "failed_terminal",
    FailedAfterExhaustion => "failed_after_exhaustion",
});

impl ConstructState {
    /// Final states are never left again
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::FailedTerminal | Self::FailedAfterExhaustion)
    }
}

/// Outcome of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Pending,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

crate::impl_domain_status_conversions!(AttemptOutcome {
    Pending => "pending",
    Succeeded => "succeeded",
    FailedRetryable => "failed_retryable",
    FailedTerminal => "failed_terminal",
});

/// One execution of the body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub number: u32,
    pub outcome: AttemptOutcome,
    /// Set while the body invocation is suspended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaiting: Option<ResumeToken>,
    /// The error a failed attempt reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepError>,
    pub started_at: DateTime<Utc>,
}

impl RetryAttempt {
    fn start(number: u32) -> Self {
        Self {
            number,
            outcome: AttemptOutcome::Pending,
            awaiting: None,
            failure: None,
            started_at: Utc::now(),
        }
    }
}

/// Status a finished run is reported with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
    Aborted,
}

crate::impl_domain_status_conversions!(RunStatus {
    Success => "success",
    Failure => "failure",
    Aborted => "aborted",
});

/// End-to-end result, set exactly once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FinalResult {
    Succeeded {
        #[serde(default)]
        output: Value,
    },
    /// The error of the attempt that ended the construct, unchanged
    Failed { error: StepError },
}

impl FinalResult {
    pub fn as_result(&self) -> std::result::Result<&Value, &StepError> {
        match self {
            Self::Succeeded { output } => Ok(output),
            Self::Failed { error } => Err(error),
        }
    }

    pub fn into_result(self) -> std::result::Result<Value, StepError> {
        match self {
            Self::Succeeded { output } => Ok(output),
            Self::Failed { error } => Err(error),
        }
    }
}

/// Classified completion of the in-flight attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptCompletion {
    Succeeded { output: Value },
    Retryable(StepError),
    Terminal(StepError),
}

/// What the orchestrator has to do after recording a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Start attempt `next_attempt` with the same body
    Retry { next_attempt: u32 },
    /// `final_result` is set
    Finished,
}

/// Where a reloaded construct has to continue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumePoint {
    /// Persisted but no attempt started yet
    NotStarted,
    /// Attempt started but its outcome was never recorded
    AttemptInFlight { attempt: u32 },
    /// Waiting for the host to deliver the outcome for `token`
    Suspended { attempt: u32, token: ResumeToken },
    /// Retryable failure recorded, next attempt not started yet
    RetryPending { next_attempt: u32 },
    Finished,
}

/// The durable retry construct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConstruct {
    id: ConstructId,
    max_attempts: u32,
    body: BodySpec,
    state: ConstructState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_attempt: Option<RetryAttempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    final_result: Option<FinalResult>,
    revision: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RetryConstruct {
    /// Create a construct in `Starting`
    ///
    /// # Errors
    /// `RetryFlowError::Config` when `max_attempts` is zero,
    /// `RetryFlowError::InvalidInput` when the body spec is blank.
    pub fn new(body: BodySpec, max_attempts: u32) -> Result<Self> {
        validate_max_attempts(max_attempts)?;
        body.validate()?;

        let now = Utc::now();
        Ok(Self {
            id: ConstructId::new(),
            max_attempts,
            body,
            state: ConstructState::Starting,
            current_attempt: None,
            final_result: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> ConstructId {
        self.id
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn body(&self) -> &BodySpec {
        &self.body
    }

    pub fn state(&self) -> ConstructState {
        self.state
    }

    pub fn current_attempt(&self) -> Option<&RetryAttempt> {
        self.current_attempt.as_ref()
    }

    /// Number of attempts started so far
    pub fn attempts_started(&self) -> u32 {
        self.current_attempt.as_ref().map_or(0, |a| a.number)
    }

    pub fn final_result(&self) -> Option<&FinalResult> {
        self.final_result.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Run status for a finished construct
    ///
    /// Terminal failures are interruptions and report `Aborted`, never
    /// `Failure`.
    pub fn run_status(&self) -> Option<RunStatus> {
        match self.state {
            ConstructState::Succeeded => Some(RunStatus::Success),
            ConstructState::FailedTerminal => Some(RunStatus::Aborted),
            ConstructState::FailedAfterExhaustion => Some(RunStatus::Failure),
            ConstructState::Starting | ConstructState::Running => None,
        }
    }

    /// Advance the revision before a save
    ///
    /// Returns the revision the store must currently hold for the write to
    /// be accepted.
    pub fn bump_revision(&mut self) -> u64 {
        let expected = self.revision;
        self.revision += 1;
        self.updated_at = Utc::now();
        expected
    }

    /// Start the next attempt
    ///
    /// From `Starting` this is attempt 1; from `Running` it requires the
    /// current attempt to have failed retryably below the limit.
    pub fn begin_attempt(&mut self) -> Result<u32> {
        let next = match (self.state, &self.current_attempt) {
            (ConstructState::Starting, None) => 1,
            (ConstructState::Running, Some(attempt))
                if attempt.outcome == AttemptOutcome::FailedRetryable
                    && attempt.number < self.max_attempts =>
            {
                attempt.number + 1
            }
            _ => return Err(self.invalid("begin an attempt")),
        };

        self.state = ConstructState::Running;
        self.current_attempt = Some(RetryAttempt::start(next));
        Ok(next)
    }

    /// Restart an attempt whose outcome was lost, keeping its number
    pub fn restart_attempt(&mut self) -> Result<u32> {
        match (&self.state, self.current_attempt.as_mut()) {
            (ConstructState::Running, Some(attempt))
                if attempt.outcome == AttemptOutcome::Pending && attempt.awaiting.is_none() =>
            {
                attempt.started_at = Utc::now();
                Ok(attempt.number)
            }
            _ => Err(self.invalid("restart the in-flight attempt")),
        }
    }

    /// Record that the in-flight attempt suspended under `token`
    pub fn suspend(&mut self, token: ResumeToken) -> Result<()> {
        match (&self.state, self.current_attempt.as_mut()) {
            (ConstructState::Running, Some(attempt))
                if attempt.outcome == AttemptOutcome::Pending && attempt.awaiting.is_none() =>
            {
                attempt.awaiting = Some(token);
                Ok(())
            }
            _ => Err(self.invalid("suspend")),
        }
    }

    /// Accept a resume for `token`, clearing the suspension
    ///
    /// # Errors
    /// `RetryFlowError::StaleResume` when the construct is not waiting on
    /// exactly this token (already resumed, finished, or a different attempt).
    pub fn accept_resume(&mut self, token: &ResumeToken) -> Result<u32> {
        let id = self.id;
        match self.current_attempt.as_mut() {
            Some(attempt)
                if self.state == ConstructState::Running
                    && attempt.awaiting.as_ref() == Some(token) =>
            {
                attempt.awaiting = None;
                Ok(attempt.number)
            }
            _ => Err(RetryFlowError::StaleResume(format!(
                "construct {id} is not awaiting token {token}"
            ))),
        }
    }

    /// Record the classified completion of the in-flight attempt
    pub fn complete_attempt(&mut self, completion: AttemptCompletion) -> Result<Transition> {
        let max_attempts = self.max_attempts;
        let attempt = match (&self.state, self.current_attempt.as_mut()) {
            (ConstructState::Running, Some(attempt))
                if attempt.outcome == AttemptOutcome::Pending && attempt.awaiting.is_none() =>
            {
                attempt
            }
            _ => return Err(self.invalid("complete the in-flight attempt")),
        };

        let (state, result) = match completion {
            AttemptCompletion::Succeeded { output } => {
                attempt.outcome = AttemptOutcome::Succeeded;
                (ConstructState::Succeeded, FinalResult::Succeeded { output })
            }
            AttemptCompletion::Terminal(error) => {
                attempt.outcome = AttemptOutcome::FailedTerminal;
                attempt.failure = Some(error.clone());
                (ConstructState::FailedTerminal, FinalResult::Failed { error })
            }
            AttemptCompletion::Retryable(error) => {
                attempt.outcome = AttemptOutcome::FailedRetryable;
                attempt.failure = Some(error.clone());
                if attempt.number < max_attempts {
                    return Ok(Transition::Retry { next_attempt: attempt.number + 1 });
                }
                (ConstructState::FailedAfterExhaustion, FinalResult::Failed { error })
            }
        };

        self.state = state;
        self.final_result = Some(result);
        Ok(Transition::Finished)
    }

    /// Where to continue after reloading this record
    pub fn resume_point(&self) -> ResumePoint {
        match (self.state, &self.current_attempt) {
            (ConstructState::Starting, _) => ResumePoint::NotStarted,
            (ConstructState::Running, Some(attempt)) => match (&attempt.outcome, &attempt.awaiting)
            {
                (AttemptOutcome::Pending, Some(token)) => {
                    ResumePoint::Suspended { attempt: attempt.number, token: token.clone() }
                }
                (AttemptOutcome::FailedRetryable, _) => {
                    ResumePoint::RetryPending { next_attempt: attempt.number + 1 }
                }
                _ => ResumePoint::AttemptInFlight { attempt: attempt.number },
            },
            (ConstructState::Running, None) => ResumePoint::NotStarted,
            _ => ResumePoint::Finished,
        }
    }

    /// Check the record invariants
    ///
    /// Stores call this on every load so a corrupt record is reported rather
    /// than resumed.
    pub fn validate(&self) -> Result<()> {
        validate_max_attempts(self.max_attempts)?;

        let attempt = self.current_attempt.as_ref();
        if let Some(attempt) = attempt {
            if attempt.number < 1 || attempt.number > self.max_attempts {
                return Err(self.corrupt(format!(
                    "attempt {} outside 1..={}",
                    attempt.number, self.max_attempts
                )));
            }
            if attempt.awaiting.is_some() && attempt.outcome != AttemptOutcome::Pending {
                return Err(self.corrupt("resume token on a completed attempt"));
            }
        }

        let consistent = match self.state {
            ConstructState::Starting => attempt.is_none() && self.final_result.is_none(),
            ConstructState::Running => {
                self.final_result.is_none()
                    && attempt.is_some_and(|a| match a.outcome {
                        AttemptOutcome::Pending => true,
                        AttemptOutcome::FailedRetryable => a.number < self.max_attempts,
                        _ => false,
                    })
            }
            ConstructState::Succeeded => {
                matches!(self.final_result, Some(FinalResult::Succeeded { .. }))
                    && attempt.is_some_and(|a| a.outcome == AttemptOutcome::Succeeded)
            }
            ConstructState::FailedTerminal => {
                matches!(self.final_result, Some(FinalResult::Failed { .. }))
                    && attempt.is_some_and(|a| a.outcome == AttemptOutcome::FailedTerminal)
            }
            ConstructState::FailedAfterExhaustion => {
                matches!(self.final_result, Some(FinalResult::Failed { .. }))
                    && attempt.is_some_and(|a| {
                        a.outcome == AttemptOutcome::FailedRetryable
                            && a.number == self.max_attempts
                    })
            }
        };

        if consistent {
            Ok(())
        } else {
            Err(self.corrupt(format!("state '{}' does not match its attempt record", self.state)))
        }
    }

    fn invalid(&self, action: &str) -> RetryFlowError {
        RetryFlowError::InvalidTransition(format!(
            "cannot {action} for construct {} in state '{}'",
            self.id, self.state
        ))
    }

    fn corrupt(&self, detail: impl Into<String>) -> RetryFlowError {
        RetryFlowError::Internal(format!(
            "construct {} record is inconsistent: {}",
            self.id,
            detail.into()
        ))
    }
}
