//! Error types for windowgate.

use thiserror::Error;

/// Main error type for windowgate operations.
///
/// Rate limit checks themselves never fail; every variant here is raised
/// while wiring a limiter up (building configs, loading files, parsing
/// requests).
#[derive(Error, Debug)]
pub enum RateLimitError {
    /// A window duration of zero milliseconds was supplied
    #[error("Configuration error: window_ms must be greater than zero")]
    InvalidWindow,

    /// A request budget of zero was supplied
    #[error("Configuration error: max_requests must be greater than zero")]
    InvalidMaxRequests,

    /// A named preset was requested that is not registered
    #[error("Unknown rate limit preset: {0}")]
    UnknownPreset(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for windowgate operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;
