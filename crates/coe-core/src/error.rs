//! Error types for directory operations.
//!
//! Only conditions that are fatal to the current operation become an [`Error`]. Expected
//! outcomes such as a rejected bind or an empty search are reported as plain values by the
//! directory client and never reach this type.

use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The transport to the directory server could not be established
    #[error("Transport error: {0}")]
    Transport(String),

    /// No usable bind could be obtained; carries every collected diagnostic
    #[error("Directory unavailable: {}", .messages.join("; "))]
    Unavailable {
        /// Messages collected while connecting and binding
        messages: Vec<String>,
    },

    /// A component was used in a state it does not support
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The directory variant does not provide this operation
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid server endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error reported by the directory protocol library
    #[error("External service error: {service}: {message}")]
    ExternalServiceError {
        /// Service name that failed
        service: String,
        /// Error message
        message: String,
    },
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Unavailable { .. } => "DIRECTORY_UNAVAILABLE",
            Self::Precondition(_) => "PRECONDITION_FAILED",
            Self::UnsupportedOperation(_) => "UNSUPPORTED_OPERATION",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::ExternalServiceError { .. } => "EXTERNAL_SERVICE_ERROR",
        }
    }

    /// Returns true if this error should be logged as a serious error.
    ///
    /// Programming errors (precondition, unsupported operation) are always loud.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Unavailable { .. }
                | Self::Precondition(_)
                | Self::UnsupportedOperation(_)
                | Self::ConfigError(_)
                | Self::ExternalServiceError { .. }
        )
    }

    /// Returns true if the error indicates misuse of the API rather than a runtime failure.
    #[must_use]
    pub const fn is_programming_error(&self) -> bool {
        matches!(self, Self::Precondition(_) | Self::UnsupportedOperation(_))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}
