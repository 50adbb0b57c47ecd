//! Domain types and models

pub mod body;
pub mod construct;
pub mod failure;

pub use body::{BodyInvocation, BodyOutcome, BodySpec, ConstructId, ResumeToken};
pub use construct::{
    AttemptCompletion, AttemptOutcome, ConstructState, FinalResult, ResumePoint, RetryAttempt,
    RetryConstruct, RunStatus, Transition,
};
pub use failure::{FlowInterruption, InterruptionCause, StepError};
