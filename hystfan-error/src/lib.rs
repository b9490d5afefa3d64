//! Error handling for Hystfan
//!
//! A single error type shared by the sensor reader, the control loop and the
//! daemon startup path. Steady-state conditions (`SensorUnavailable`,
//! `ActuationFailed`) are absorbed by the control loop; `ConfigurationInvalid`
//! stops the daemon before it touches the fan.

use std::io;
use std::path::PathBuf;

/// Result type alias using HystfanError
pub type Result<T> = std::result::Result<T, HystfanError>;

/// Unified error type for all Hystfan operations
#[derive(thiserror::Error, Debug)]
pub enum HystfanError {
    // ============================================================================
    // Steady-state hardware conditions
    // ============================================================================
    #[error("Sensor unavailable at {path}: {reason}")]
    SensorUnavailable {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to write fan mode {code} to {path}: {reason}")]
    ActuationFailed {
        path: PathBuf,
        code: u8,
        reason: String,
    },

    #[error("Unsupported fan mode code {0}")]
    UnsupportedMode(u8),

    // ============================================================================
    // Startup errors
    // ============================================================================
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl HystfanError {
    /// Create a sensor error for the given source path
    pub fn sensor(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SensorUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an actuation error for a write of `code` to `path`
    pub fn actuation(path: impl Into<PathBuf>, code: u8, reason: impl Into<String>) -> Self {
        Self::ActuationFailed {
            path: path.into(),
            code,
            reason: reason.into(),
        }
    }

    /// Create a configuration error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigurationInvalid(msg.into())
    }

    /// Whether the daemon must refuse to start (or stop) on this error.
    ///
    /// Sensor and actuation failures are retried on the next poll.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationInvalid(_) | Self::JsonParse(_)
        )
    }
}
