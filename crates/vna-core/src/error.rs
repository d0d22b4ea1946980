//! Error types for vna-core operations.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type for vna-core operations.
pub type Result<T> = std::result::Result<T, VnaError>;

/// Errors that can occur while planning, running or post-processing a sweep.
#[derive(Debug, Error)]
pub enum VnaError {
    /// Malformed sweep definition or argument, detected before any device I/O.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Communication with the instrument failed.
    #[error("Device error: {0}")]
    DeviceError(String),

    /// No instrument could be opened.
    #[error("No instrument found")]
    DeviceNotFound,

    /// An asynchronous measurement ended before delivering every point.
    #[error("Measurement session aborted: {0}")]
    SessionAborted(String),

    /// A measurement is already running on this device handle.
    #[error("A measurement session is already active on this device")]
    SessionActive,

    /// The external trigger did not fire within the configured timeout.
    #[error("External trigger did not fire within {0:?}")]
    TriggerTimeout(Duration),

    /// Calibration could not be solved or applied.
    #[error("Calibration error: {0}")]
    Calibration(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Calibration file error: {0}")]
    CalibrationFile(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Touchstone parse error at line {line}: {message}")]
    Touchstone { line: usize, message: String },
}

impl VnaError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        VnaError::InvalidParameter(msg.into())
    }

    pub fn device<S: Into<String>>(msg: S) -> Self {
        VnaError::DeviceError(msg.into())
    }

    pub fn aborted<S: Into<String>>(msg: S) -> Self {
        VnaError::SessionAborted(msg.into())
    }

    pub fn calibration<S: Into<String>>(msg: S) -> Self {
        VnaError::Calibration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing.cal");
        let err: VnaError = io_err.into();
        assert!(matches!(err, VnaError::Io(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            VnaError::invalid("count must be >= 1").to_string(),
            "Invalid parameter: count must be >= 1"
        );
        assert_eq!(
            VnaError::device("link lost").to_string(),
            "Device error: link lost"
        );
        assert!(VnaError::TriggerTimeout(Duration::from_millis(250))
            .to_string()
            .contains("250ms"));
    }
}
