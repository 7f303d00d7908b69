//! Custom error types for the application.
//!
//! This module defines the primary error type, `CalibError`, for the whole
//! calibration suite. Using the `thiserror` crate, it provides a centralized
//! and consistent way to handle the different kinds of errors that can occur,
//! from I/O and configuration issues to instrument-specific problems.
//!
//! Instrument *soft* errors (the string lists the magnet accumulates during a
//! move) are deliberately not represented here: the procedure drains and logs
//! them as warnings, and execution continues. Only hard failures (adapter I/O,
//! settle timeouts, bad configuration) become `CalibError` values that
//! propagate to the experiment runner.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, CalibError>;

/// Application error type.
#[derive(Error, Debug)]
pub enum CalibError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Calibration file error: {0}")]
    Calibration(String),

    #[error("Timed out waiting {0:?} for magnet motion to settle")]
    SettleTimeout(std::time::Duration),

    #[error("Sweep definition error: {0}")]
    Sweep(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CalibError::Instrument("magnet axis x stalled".to_string());
        assert_eq!(err.to_string(), "Instrument error: magnet axis x stalled");
    }

    #[test]
    fn test_settle_timeout_display() {
        let err = CalibError::SettleTimeout(std::time::Duration::from_secs(30));
        assert!(err.to_string().contains("30s"));
    }
}
