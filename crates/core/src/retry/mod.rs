//! Durable retry construct
//!
//! - [`ports`]: body invoker, construct store and console boundaries
//! - [`classifier`]: retryable vs terminal failures
//! - [`service`]: the orchestrator driving attempts

pub mod classifier;
pub mod ports;
pub mod service;

pub use classifier::{classify, completion_for, FailureClass};
pub use service::{ConstructStatus, RetryService};
