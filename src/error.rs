//! Error types for the FilaZero rate limiter.

use thiserror::Error;

/// Main error type for limiter operations.
///
/// A rejected request is not an error; see [`crate::ratelimit::RateLimiter::is_allowed`].
#[derive(Error, Debug)]
pub enum FilazeroError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for FilazeroError {
    fn from(err: config::ConfigError) -> Self {
        FilazeroError::Config(err.to_string())
    }
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, FilazeroError>;
