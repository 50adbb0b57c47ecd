//! # Retryflow Infrastructure
//!
//! Infrastructure implementations of the retry construct's ports.
//!
//! This crate contains:
//! - Construct stores (in-memory, JSON files, SQLite)
//! - Run consoles (tracing, buffered)
//! - Configuration loading and logging setup
//! - The resume dispatcher
//!
//! ## Architecture
//! - Implements traits defined in `retryflow-core`
//! - Contains all "impure" code (file system, database, background tasks)

pub mod config;
pub mod console;
pub mod errors;
pub mod scheduling;
pub mod store;

// Re-export commonly used items
pub use console::{BufferedConsole, TracingConsole};
pub use errors::InfraError;
pub use scheduling::{DispatcherConfig, ResumeDispatcher, ResumeEvent};
pub use store::{build_store, FileConstructStore, InMemoryConstructStore, SqliteConstructStore};
