//! Shared test helpers for `retryflow-core` integration tests.
//!
//! Lightweight in-memory implementations of the retry ports so tests can
//! focus on orchestration behaviour instead of storage plumbing.

#![allow(dead_code)]

pub mod console;
pub mod invoker;
pub mod store;

pub use console::BufferedConsole;
pub use invoker::{ScriptedInvoker, Step};
pub use store::MockConstructStore;
