//! # Retryflow Domain
//!
//! Domain types for the durable retry construct.
//!
//! This crate contains:
//! - The durable construct record and its state transitions
//! - Body specifications, outcomes and resume tokens
//! - The step failure taxonomy, including the flow interruption marker
//! - Domain error types and Result definitions
//! - Configuration structures and constants
//!
//! ## Architecture
//! - Depends only on `retryflow-common` (foundation tier)
//! - No I/O, no async runtime

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
