//! Domain constants
//!
//! Console markers are part of the observable log contract consumed by
//! existing log scrapers; change them only together with those consumers.

/// Attempt limit used when configuration does not provide one
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Notice written between a retryable failure and the next attempt
pub const RETRY_NOTICE: &str = "Retrying";

/// Written once when a construct starts
pub const BLOCK_START_MARKER: &str = "[Pipeline] retry";

/// Written before each attempt's body output
pub const ATTEMPT_OPEN_MARKER: &str = "[Pipeline] {";

/// Written after each attempt's body output
pub const ATTEMPT_CLOSE_MARKER: &str = "[Pipeline] }";

/// Written once when a construct finishes
pub const BLOCK_END_MARKER: &str = "[Pipeline] // retry";

/// Version written into persisted construct envelopes
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Default tracing filter
pub const DEFAULT_LOG_LEVEL: &str = "info";
