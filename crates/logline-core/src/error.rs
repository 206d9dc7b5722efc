//! Error types for logline

use thiserror::Error;

/// Result type alias for operations that write to a sink
pub type Result<T, E = SinkError> = std::result::Result<T, E>;

/// Configuration rejected at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A URL include/exclude pattern could not be compiled
    #[error("invalid URL pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern as configured
        pattern: String,
        /// Why it was rejected
        reason: String,
    },

    /// `request.maxBodySize` must be at least one character
    #[error("request.maxBodySize must be greater than zero")]
    InvalidMaxBodySize,

    /// The mask value is blank or would itself be masked again
    #[error("invalid mask value `{0}`")]
    InvalidMaskValue(String),

    /// JSON configuration document could not be parsed
    #[error("configuration parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Environment overrides could not be read
    #[cfg(feature = "env")]
    #[error("environment configuration error: {0}")]
    Env(#[from] envy::Error),
}

/// A sink failed to accept a rendered line
#[derive(Debug, Error)]
pub enum SinkError {
    /// The underlying writer returned an I/O error
    #[error("log sink write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The sink's writer lock was poisoned by a panicking writer
    #[error("log sink is poisoned")]
    Poisoned,
}

/// A log entry could not be serialized
#[derive(Debug, Error)]
#[error("failed to serialize log entry: {0}")]
pub struct EncodeError(#[from] pub serde_json::Error);

/// The process-wide default could not be installed
#[derive(Debug, Error)]
pub enum DefaultsError {
    /// `defaults::install` was already called
    #[error("logging defaults are already installed")]
    AlreadyInstalled,
}
