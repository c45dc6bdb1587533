//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout sqlmend.
//! Every error maps to a stable error code for programmatic handling.
//!
//! # Error Categories
//! - `ConnectionLost`: Transient connection drop, recovered by reconnect-and-retry
//! - `RetriesExhausted`: The retry budget ran out while the connection kept dropping
//! - `InvalidInput`: Malformed caller input, rejected before any driver call
//! - `Driver`: Any other driver-reported failure, never retried
//! - `ConnectionFailed`: Opening a connection failed
//! - `NotConnected`: Operation issued after the connection was closed
//! - `Decode`: A row could not be deserialized into the requested type
//! - `ConfigError`: Profile registry errors

use thiserror::Error;

/// Main error type for sqlmend operations
#[derive(Error, Debug)]
pub enum SqlmendError {
    /// The server dropped the connection (idle timeout, restart, network)
    #[error("Connection lost ({engine}): {detail}")]
    ConnectionLost { engine: String, detail: String },

    /// Every attempt in the retry budget hit a lost connection
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Driver-reported failure (syntax error, constraint violation, ...)
    #[error("Driver error ({engine}): {detail}")]
    Driver { engine: String, code: Option<i32>, detail: String },

    /// Database connection could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No live connection (the executor was closed)
    #[error("Not connected: the connection was closed")]
    NotConnected,

    /// Row deserialization failed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration error (file not found, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SqlmendError {
    /// Convert error to a stable error code string
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionLost { .. } => "CONNECTION_LOST",
            Self::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Driver { .. } => "DRIVER_ERROR",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Decode(_) => "DECODE_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Whether a reconnect may resolve this error
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. })
    }

    /// Driver-specific error code, when the driver reported one
    #[must_use]
    pub const fn driver_code(&self) -> Option<i32> {
        match self {
            Self::Driver { code, .. } => *code,
            _ => None,
        }
    }

    /// Create a connection lost error
    pub fn connection_lost(engine: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ConnectionLost { engine: engine.into(), detail: detail.into() }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a driver error
    pub fn driver(engine: impl Into<String>, code: Option<i32>, detail: impl Into<String>) -> Self {
        Self::Driver { engine: engine.into(), code, detail: detail.into() }
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }
}

/// Result type alias for sqlmend operations
pub type Result<T> = std::result::Result<T, SqlmendError>;
