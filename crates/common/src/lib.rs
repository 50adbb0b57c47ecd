//! Shared foundation utilities for the Retryflow crates.
//!
//! # Feature Tiers
//!
//! - `foundation`: error taxonomy and the `ErrorClassification` capability
//!   trait used to tell interruptions apart from ordinary failures
//! - `observability`: tracing subscriber setup (opt-in)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Observability tier
// --------------------------------------------------------------
#[cfg(feature = "observability")]
pub mod logging;

#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "observability")]
pub use logging::{init_tracing, LogFormat, LoggingError};
