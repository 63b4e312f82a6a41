//! Error handling for pcbmill
//!
//! The taxonomy follows how problems are recovered:
//! - Parse warnings never become errors; parsers log and collect them
//! - Parse failures mean no usable geometry came out of a file
//! - Operation failures mean a clearing or job calculation produced nothing usable
//! - Cancellation is a requested abort and is never a failure
//!
//! All error types use `thiserror`.

use std::io;
use thiserror::Error;

/// Errors returned by parsers, clearing operations and job generation.
#[derive(Error, Debug)]
pub enum CamError {
    /// A file produced no drawable geometry.
    #[error("{format} parse failed: {reason}")]
    ParseFailed {
        /// File format name ("Gerber", "Excellon", ...).
        format: &'static str,
        /// Why nothing usable came out.
        reason: String,
    },

    /// A geometry operation produced empty or unusable output.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// The caller requested cancellation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Parameters were rejected before any work started.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// No postprocessor is registered under the requested name.
    #[error("Unknown postprocessor: {0}")]
    UnknownPostprocessor(String),

    /// I/O error while reading input or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CamError {
    /// Shorthand for a parse failure.
    pub fn parse_failed(format: &'static str, reason: impl Into<String>) -> Self {
        Self::ParseFailed {
            format,
            reason: reason.into(),
        }
    }

    /// True when the error is a requested abort rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for pcbmill operations.
pub type CamResult<T> = Result<T, CamError>;

/// A successful result paired with a human-readable status line.
#[derive(Debug, Clone)]
pub struct JobOutcome<T> {
    pub value: T,
    pub status: String,
}

impl<T> JobOutcome<T> {
    pub fn new(value: T, status: impl Into<String>) -> Self {
        Self {
            value,
            status: status.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CamError::parse_failed("Gerber", "no geometry");
        assert_eq!(err.to_string(), "Gerber parse failed: no geometry");

        let err = CamError::OperationFailed("margin smaller than tool".to_string());
        assert_eq!(err.to_string(), "Operation failed: margin smaller than tool");
    }

    #[test]
    fn test_cancelled_is_not_failure() {
        assert!(CamError::Cancelled.is_cancelled());
        assert!(!CamError::OperationFailed(String::new()).is_cancelled());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: CamError = io_err.into();
        assert!(matches!(err, CamError::Io(_)));
    }
}
