//! Tracing subscriber initialisation
//!
//! Binaries and integration harnesses call [`init_tracing`] once at start-up.
//! `RUST_LOG` takes precedence over the configured default level.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Errors raised while installing the global subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Install the global tracing subscriber
///
/// # Errors
///
/// Returns [`LoggingError::InvalidFilter`] when `default_level` is not a valid
/// `EnvFilter` directive and [`LoggingError::AlreadyInitialized`] when another
/// subscriber was installed first.
pub fn init_tracing(default_level: &str, format: LogFormat) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level).map_err(|e| LoggingError::InvalidFilter {
            filter: default_level.to_string(),
            message: e.to_string(),
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_current_span(true)).try_init(),
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
    tracing::debug!(level = default_level, ?format, "tracing initialised");
    Ok(())
}
