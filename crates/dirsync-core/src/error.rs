//! Error types for directory synchronization.
//!
//! This module provides the error type shared by the record model, the sync engine and the
//! directory collaborators, together with stable error codes for programmatic handling.

use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The directory rejected a create or modify request
    #[error("Directory write rejected (code {code}): {message}")]
    DirectoryWrite {
        /// Native result code returned by the directory
        code: u32,
        /// Diagnostic message returned by the directory
        message: String,
    },

    /// Malformed distinguished name
    #[error("Invalid distinguished name: {0}")]
    InvalidDn(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transport or protocol failure talking to an external service
    #[error("External service error: {service}: {message}")]
    ExternalServiceError {
        /// Service name that failed
        service: String,
        /// Error message
        message: String,
    },

    /// Failure writing exported output
    #[error("I/O error: {0}")]
    Io(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a [`Error::DirectoryWrite`] from a native result code and message.
    #[must_use]
    pub fn directory_write(code: u32, message: impl Into<String>) -> Self {
        Self::DirectoryWrite {
            code,
            message: message.into(),
        }
    }

    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DirectoryWrite { .. } => "DIRECTORY_WRITE",
            Self::InvalidDn(_) => "INVALID_DN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::ExternalServiceError { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Returns the native result code if the directory rejected a write.
    #[must_use]
    pub const fn result_code(&self) -> Option<u32> {
        match self {
            Self::DirectoryWrite { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the directory itself rejected the request, as opposed to a transport,
    /// configuration or local failure.
    #[must_use]
    pub const fn is_write_rejection(&self) -> bool {
        matches!(self, Self::DirectoryWrite { .. })
    }
}

// Conversions from external error types
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::directory_write(32, "no such object").error_code(),
            "DIRECTORY_WRITE"
        );
        assert_eq!(Error::InvalidDn("x".to_string()).error_code(), "INVALID_DN");
        assert_eq!(Error::NotFound("x".to_string()).error_code(), "NOT_FOUND");
        assert_eq!(
            Error::ConfigError("x".to_string()).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(Error::Timeout("x".to_string()).error_code(), "TIMEOUT");
        assert_eq!(
            Error::ExternalServiceError {
                service: "ldap".to_string(),
                message: "msg".to_string()
            }
            .error_code(),
            "EXTERNAL_SERVICE_ERROR"
        );
        assert_eq!(Error::Io("x".to_string()).error_code(), "IO_ERROR");
    }

    #[test]
    fn test_error_display() {
        let err = Error::directory_write(20, "attribute or value exists");
        assert_eq!(
            err.to_string(),
            "Directory write rejected (code 20): attribute or value exists"
        );

        let err = Error::ExternalServiceError {
            service: "ldap".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "External service error: ldap: connection refused"
        );
    }

    #[test]
    fn test_write_rejection() {
        let err = Error::directory_write(16, "no such attribute");
        assert!(err.is_write_rejection());
        assert_eq!(err.result_code(), Some(16));

        let err = Error::Timeout("modify".to_string());
        assert!(!err.is_write_rejection());
        assert_eq!(err.result_code(), None);
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        let converted: Error = err.into();
        assert_eq!(converted, Error::Io("closed".to_string()));
    }
}
