//! Port interfaces for the retry construct
//!
//! These traits define the boundaries between the orchestrator and the host:
//! who runs the body, where construct records live, and where console lines
//! go.

use async_trait::async_trait;
use retryflow_domain::{
    BodyInvocation, BodyOutcome, ConstructId, Result, ResumeToken, RetryConstruct,
};

/// What starting a body invocation produced
#[derive(Debug, Clone, PartialEq)]
pub enum BodyPoll {
    /// The body ran to completion inline
    Completed(BodyOutcome),
    /// The body is waiting on something external; the host will deliver the
    /// outcome later through `RetryService::resume` with this token
    Suspended(ResumeToken),
}

/// Trait for running one attempt of the nested body
#[async_trait]
pub trait BodyInvoker: Send + Sync {
    /// Start one attempt
    ///
    /// An `Err` means the invoker itself failed and nothing about the attempt
    /// is known; body failures are reported as
    /// `BodyPoll::Completed(BodyOutcome::Failed { .. })`.
    async fn start(&self, invocation: &BodyInvocation) -> Result<BodyPoll>;
}

/// Trait for persisting construct records
///
/// Every write after `insert` goes through `save` with the revision the
/// caller read. Implementations must reject the write with
/// `RetryFlowError::Conflict` unless the stored revision equals
/// `expected_revision`.
#[async_trait]
pub trait ConstructStore: Send + Sync {
    /// Store a new record; `Conflict` if the id already exists
    async fn insert(&self, construct: &RetryConstruct) -> Result<()>;

    /// Replace a record under optimistic concurrency
    async fn save(&self, construct: &RetryConstruct, expected_revision: u64) -> Result<()>;

    /// Load a record by id
    async fn load(&self, id: ConstructId) -> Result<Option<RetryConstruct>>;

    /// Every record whose state is not final
    async fn list_unfinished(&self) -> Result<Vec<RetryConstruct>>;

    /// Remove a record, returning whether it existed
    async fn delete(&self, id: ConstructId) -> Result<bool>;
}

/// Trait for the run's console
///
/// Fire-and-forget: a console that cannot write must not fail the run.
pub trait RunConsole: Send + Sync {
    fn write_line(&self, construct_id: ConstructId, line: &str);
}
