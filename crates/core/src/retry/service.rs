//! Retry orchestrator - core business logic
//!
//! Drives a [`RetryConstruct`] through its attempts. The construct record is
//! persisted at every transition, so the service itself holds no state: a
//! fresh service over the same store continues where a crashed one stopped.

use std::sync::Arc;

use retryflow_domain::constants::{
    ATTEMPT_CLOSE_MARKER, ATTEMPT_OPEN_MARKER, BLOCK_END_MARKER, BLOCK_START_MARKER, RETRY_NOTICE,
};
use retryflow_domain::{
    BodyInvocation, BodyOutcome, BodySpec, ConstructId, FinalResult, Result, ResumePoint,
    ResumeToken, RetryConstruct, RetryFlowError, RunStatus, Transition,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::classifier::completion_for;
use super::ports::{BodyInvoker, BodyPoll, ConstructStore, RunConsole};

/// Externally visible status of a construct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConstructStatus {
    /// Waiting for the host to deliver the outcome of `attempt`
    Suspended { id: ConstructId, attempt: u32, token: ResumeToken },
    /// An attempt is in flight or about to start; `recover` drives it
    Pending { id: ConstructId, attempt: u32 },
    /// The construct is done and will never run again
    Finished { id: ConstructId, attempts: u32, run_status: RunStatus, result: FinalResult },
}

impl ConstructStatus {
    pub fn id(&self) -> ConstructId {
        match self {
            Self::Suspended { id, .. } | Self::Pending { id, .. } | Self::Finished { id, .. } => *id,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

/// How the drive loop obtains the attempt to invoke
#[derive(Debug, Clone, Copy)]
enum NextAttempt {
    Begin,
    Restart,
}

/// Retry orchestrator
pub struct RetryService {
    invoker: Arc<dyn BodyInvoker>,
    store: Arc<dyn ConstructStore>,
    console: Arc<dyn RunConsole>,
}

impl RetryService {
    /// Create a new retry service
    pub fn new(
        invoker: Arc<dyn BodyInvoker>,
        store: Arc<dyn ConstructStore>,
        console: Arc<dyn RunConsole>,
    ) -> Self {
        Self { invoker, store, console }
    }

    /// Create a construct for `body` and drive it until it finishes or suspends
    ///
    /// # Errors
    /// `RetryFlowError::Config` when `max_attempts` is zero; nothing is
    /// persisted or invoked in that case.
    #[instrument(skip(self, body), fields(body_kind = %body.kind, construct_id = tracing::field::Empty))]
    pub async fn run(&self, body: BodySpec, max_attempts: u32) -> Result<ConstructStatus> {
        let construct = RetryConstruct::new(body, max_attempts)?;
        tracing::Span::current().record("construct_id", tracing::field::display(construct.id()));

        self.store.insert(&construct).await?;
        info!(max_attempts, "Retry construct created");

        self.console.write_line(construct.id(), BLOCK_START_MARKER);
        self.drive(construct, NextAttempt::Begin).await
    }

    /// Deliver the outcome of a suspended attempt
    ///
    /// # Errors
    /// - `RetryFlowError::NotFound` for an unknown id
    /// - `RetryFlowError::StaleResume` when the construct is not waiting on
    ///   `token` (already resumed, already finished, or an older attempt)
    /// - `RetryFlowError::Conflict` when another resume for the same token
    ///   won the race
    #[instrument(skip(self, token, outcome), fields(construct_id = %id))]
    pub async fn resume(
        &self,
        id: ConstructId,
        token: ResumeToken,
        outcome: BodyOutcome,
    ) -> Result<ConstructStatus> {
        let mut construct = self.load_existing(id).await?;
        let attempt = construct.accept_resume(&token).map_err(|err| {
            warn!(token = %token, "Rejected resume");
            err
        })?;
        debug!(attempt, "Resuming suspended attempt");

        match self.record_outcome(&mut construct, outcome).await? {
            Transition::Retry { .. } => self.drive(construct, NextAttempt::Begin).await,
            Transition::Finished => self.finish(&construct),
        }
    }

    /// Continue every unfinished construct after a restart
    ///
    /// Attempts that were started but never reported are invoked again with
    /// the same number; suspended constructs keep waiting for `resume`.
    /// A construct that fails to recover is logged and skipped.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<Vec<ConstructStatus>> {
        let unfinished = self.store.list_unfinished().await?;
        info!(count = unfinished.len(), "Recovering unfinished retry constructs");

        let mut statuses = Vec::with_capacity(unfinished.len());
        for construct in unfinished {
            let id = construct.id();
            match self.recover_one(construct).await {
                Ok(status) => statuses.push(status),
                Err(err) => {
                    error!(construct_id = %id, error = %err, "Failed to recover retry construct");
                }
            }
        }
        Ok(statuses)
    }

    /// Current status without driving anything
    pub async fn status(&self, id: ConstructId) -> Result<ConstructStatus> {
        let construct = self.load_existing(id).await?;
        match construct.resume_point() {
            ResumePoint::Finished => self.finished_status(&construct),
            ResumePoint::Suspended { attempt, token } => {
                Ok(ConstructStatus::Suspended { id, attempt, token })
            }
            ResumePoint::AttemptInFlight { attempt } => {
                Ok(ConstructStatus::Pending { id, attempt })
            }
            ResumePoint::RetryPending { next_attempt } => {
                Ok(ConstructStatus::Pending { id, attempt: next_attempt })
            }
            ResumePoint::NotStarted => Ok(ConstructStatus::Pending { id, attempt: 1 }),
        }
    }

    async fn recover_one(&self, construct: RetryConstruct) -> Result<ConstructStatus> {
        let id = construct.id();
        match construct.resume_point() {
            ResumePoint::NotStarted => {
                debug!(construct_id = %id, "Starting construct that never ran");
                self.console.write_line(id, BLOCK_START_MARKER);
                self.drive(construct, NextAttempt::Begin).await
            }
            ResumePoint::AttemptInFlight { attempt } => {
                warn!(construct_id = %id, attempt, "Outcome of attempt was lost, invoking it again");
                self.drive(construct, NextAttempt::Restart).await
            }
            ResumePoint::RetryPending { next_attempt } => {
                debug!(construct_id = %id, next_attempt, "Starting pending retry");
                // The failure was persisted but its transcript lines may not have been written
                let failure = construct.current_attempt().and_then(|a| a.failure.as_ref());
                self.console.write_line(id, ATTEMPT_CLOSE_MARKER);
                self.write_retry_notice(id, failure.map(ToString::to_string));
                self.drive(construct, NextAttempt::Begin).await
            }
            ResumePoint::Suspended { attempt, token } => {
                debug!(construct_id = %id, attempt, "Construct still waiting for resume");
                Ok(ConstructStatus::Suspended { id, attempt, token })
            }
            ResumePoint::Finished => self.finished_status(&construct),
        }
    }

    /// Invoke attempts until the construct finishes or suspends
    async fn drive(
        &self,
        mut construct: RetryConstruct,
        mut next: NextAttempt,
    ) -> Result<ConstructStatus> {
        let id = construct.id();
        loop {
            let attempt = match next {
                NextAttempt::Begin => construct.begin_attempt()?,
                NextAttempt::Restart => construct.restart_attempt()?,
            };
            self.persist(&mut construct).await?;
            debug!(
                construct_id = %id,
                attempt,
                max_attempts = construct.max_attempts(),
                "Attempt started"
            );
            self.console.write_line(id, ATTEMPT_OPEN_MARKER);

            let invocation =
                BodyInvocation { construct_id: id, attempt, body: construct.body().clone() };
            let outcome = match self.invoker.start(&invocation).await? {
                BodyPoll::Completed(outcome) => outcome,
                BodyPoll::Suspended(token) => {
                    construct.suspend(token.clone())?;
                    self.persist(&mut construct).await?;
                    info!(construct_id = %id, attempt, "Attempt suspended");
                    return Ok(ConstructStatus::Suspended { id, attempt, token });
                }
            };

            match self.record_outcome(&mut construct, outcome).await? {
                Transition::Retry { .. } => next = NextAttempt::Begin,
                Transition::Finished => return self.finish(&construct),
            }
        }
    }

    /// Classify and persist the outcome of the in-flight attempt
    async fn record_outcome(
        &self,
        construct: &mut RetryConstruct,
        outcome: BodyOutcome,
    ) -> Result<Transition> {
        let id = construct.id();
        let failure = match &outcome {
            BodyOutcome::Failed { error } => Some(error.to_string()),
            BodyOutcome::Succeeded { .. } => None,
        };

        let transition = construct.complete_attempt(completion_for(outcome))?;
        self.persist(construct).await?;
        self.console.write_line(id, ATTEMPT_CLOSE_MARKER);

        if let Transition::Retry { next_attempt } = transition {
            info!(
                construct_id = %id,
                next_attempt,
                error = failure.as_deref().unwrap_or_default(),
                "Attempt failed, retrying"
            );
            self.write_retry_notice(id, failure);
        }
        Ok(transition)
    }

    fn write_retry_notice(&self, id: ConstructId, failure: Option<String>) {
        if let Some(message) = failure {
            self.console.write_line(id, &message);
        }
        self.console.write_line(id, RETRY_NOTICE);
    }

    fn finish(&self, construct: &RetryConstruct) -> Result<ConstructStatus> {
        let status = self.finished_status(construct)?;
        if construct.run_status() == Some(RunStatus::Aborted) {
            if let Some(FinalResult::Failed { error }) = construct.final_result() {
                let reason = match error.interruption() {
                    Some(interruption) => interruption.to_string(),
                    None => error.to_string(),
                };
                self.console.write_line(construct.id(), &reason);
            }
        }
        self.console.write_line(construct.id(), BLOCK_END_MARKER);

        if let ConstructStatus::Finished { attempts, run_status, .. } = &status {
            match run_status {
                RunStatus::Success => {
                    info!(construct_id = %construct.id(), attempts, "Retry construct succeeded");
                }
                RunStatus::Failure | RunStatus::Aborted => {
                    warn!(
                        construct_id = %construct.id(),
                        attempts,
                        run_status = %run_status,
                        "Retry construct failed"
                    );
                }
            }
        }
        Ok(status)
    }

    fn finished_status(&self, construct: &RetryConstruct) -> Result<ConstructStatus> {
        match (construct.run_status(), construct.final_result()) {
            (Some(run_status), Some(result)) => Ok(ConstructStatus::Finished {
                id: construct.id(),
                attempts: construct.attempts_started(),
                run_status,
                result: result.clone(),
            }),
            _ => Err(RetryFlowError::Internal(format!(
                "construct {} has no final result in state '{}'",
                construct.id(),
                construct.state()
            ))),
        }
    }

    async fn persist(&self, construct: &mut RetryConstruct) -> Result<()> {
        let expected = construct.bump_revision();
        self.store.save(construct, expected).await
    }

    async fn load_existing(&self, id: ConstructId) -> Result<RetryConstruct> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| RetryFlowError::NotFound(format!("retry construct {id}")))
    }
}
