//! Background task for delivering resume events
//!
//! Follows the lifecycle rules used throughout the infra crate:
//! - Explicit lifecycle management (start/stop)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout on shutdown

pub mod error;
pub mod resume_dispatcher;

pub use error::{DispatcherError, DispatcherResult};
pub use resume_dispatcher::{DispatcherConfig, ResumeCompletion, ResumeDispatcher, ResumeEvent};
