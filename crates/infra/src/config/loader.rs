//! Configuration loader
//!
//! Loads Retryflow configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. If `RETRYFLOW_STORE_BACKEND` is set, the configuration comes from the
//!    environment
//! 2. Otherwise the loader probes for a config file (JSON or TOML)
//! 3. Without either, the defaults are used
//!
//! The result is always validated before it is returned.
//!
//! ## Environment Variables
//! - `RETRYFLOW_STORE_BACKEND`: `memory`, `file` or `sqlite` (required for env loading)
//! - `RETRYFLOW_STORE_PATH`: directory (file) or database file (sqlite)
//! - `RETRYFLOW_DEFAULT_MAX_ATTEMPTS`: attempt limit used when none is given
//! - `RETRYFLOW_LOG_LEVEL`: `EnvFilter` directive used when `RUST_LOG` is unset
//! - `RETRYFLOW_LOG_JSON`: emit JSON log lines (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./retryflow.toml` or `./retryflow.json` (current working directory)
//! 2. `../retryflow.toml` or `../retryflow.json` (parent directory)
//! 3. Next to the executable

use std::path::{Path, PathBuf};

use retryflow_common::{init_tracing, LogFormat};
use retryflow_domain::{
    LoggingConfig, Result, RetryDefaults, RetryFlowConfig, RetryFlowError, StoreBackend,
    StoreConfig,
};

use crate::errors::InfraError;

pub const ENV_STORE_BACKEND: &str = "RETRYFLOW_STORE_BACKEND";
pub const ENV_STORE_PATH: &str = "RETRYFLOW_STORE_PATH";
pub const ENV_DEFAULT_MAX_ATTEMPTS: &str = "RETRYFLOW_DEFAULT_MAX_ATTEMPTS";
pub const ENV_LOG_LEVEL: &str = "RETRYFLOW_LOG_LEVEL";
pub const ENV_LOG_JSON: &str = "RETRYFLOW_LOG_JSON";

const CONFIG_FILE_NAMES: [&str; 2] = ["retryflow.toml", "retryflow.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `RetryFlowError::Config` if the selected source is invalid or
/// the loaded configuration fails validation.
pub fn load() -> Result<RetryFlowConfig> {
    let config = if std::env::var_os(ENV_STORE_BACKEND).is_some() {
        let config = load_from_env()?;
        tracing::info!("Configuration loaded from environment variables");
        config
    } else if let Some(path) = probe_config_paths() {
        load_from_file(Some(path))?
    } else {
        tracing::info!("No configuration found, using defaults");
        RetryFlowConfig::default()
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// `RETRYFLOW_STORE_BACKEND` is required; every other variable falls back to
/// its default.
///
/// # Errors
/// Returns `RetryFlowError::Config` if the backend variable is missing or any
/// variable has an invalid value.
pub fn load_from_env() -> Result<RetryFlowConfig> {
    let backend = env_var(ENV_STORE_BACKEND)?
        .parse::<StoreBackend>()
        .map_err(|e| RetryFlowError::Config(format!("{ENV_STORE_BACKEND}: {e}")))?;
    let path = std::env::var(ENV_STORE_PATH).ok().map(PathBuf::from);

    let default_max_attempts = match std::env::var(ENV_DEFAULT_MAX_ATTEMPTS) {
        Ok(value) => value.parse::<u32>().map_err(|e| {
            RetryFlowError::Config(format!("Invalid {ENV_DEFAULT_MAX_ATTEMPTS} '{value}': {e}"))
        })?,
        Err(_) => RetryDefaults::default().default_max_attempts,
    };

    let logging_defaults = LoggingConfig::default();
    let level = std::env::var(ENV_LOG_LEVEL).unwrap_or(logging_defaults.level);
    let json = env_bool(ENV_LOG_JSON, logging_defaults.json);

    Ok(RetryFlowConfig {
        store: StoreConfig { backend, path },
        retry: RetryDefaults { default_max_attempts },
        logging: LoggingConfig { level, json },
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations.
///
/// # Errors
/// Returns `RetryFlowError::Config` if the file is missing, unreadable or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<RetryFlowConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(RetryFlowError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            RetryFlowError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| RetryFlowError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration by file extension (`.json` or `.toml`)
fn parse_config(contents: &str, path: &Path) -> Result<RetryFlowConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents).map_err(|e| InfraError::from(e).into()),
        "json" => serde_json::from_str(contents)
            .map_err(|e| RetryFlowError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(RetryFlowError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a configuration file
///
/// Returns the first file found, or `None`.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.join(".."));
        dirs.insert(0, cwd);
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

/// Initialise tracing from the logging section
///
/// # Errors
/// Returns `RetryFlowError::Config` for an invalid filter directive or when
/// a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let format = if config.json { LogFormat::Json } else { LogFormat::Pretty };
    init_tracing(&config.level, format).map_err(|e| RetryFlowError::Config(e.to_string()))
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        RetryFlowError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
