//! # Retryflow Core
//!
//! Pure orchestration layer - no storage or host dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits)
//! - Failure classification
//! - The retry orchestrator service
//!
//! ## Architecture Principles
//! - Only depends on `retryflow-common` and `retryflow-domain`
//! - No database, filesystem, or scheduler code
//! - All external dependencies via traits

pub mod retry;

pub use retry::ports::{BodyInvoker, BodyPoll, ConstructStore, RunConsole};
pub use retry::{classify, completion_for, ConstructStatus, FailureClass, RetryService};
