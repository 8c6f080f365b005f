//! Error types and handling for `AccessNav`

use thiserror::Error;

use crate::api::ApiError;

/// Why a position could not be produced.
///
/// Callers branch on the kind; the display text is for humans only.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationErrorKind {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("timed out while locating")]
    Timeout,
    #[error("geolocation is not supported on this platform")]
    Unsupported,
    /// A fix is still being acquired; the caller may retry.
    #[error("still determining your location")]
    Pending,
}

/// Main error type for the `AccessNav` library
#[derive(Error, Debug)]
pub enum AccessNavError {
    /// Missing or empty required input; no network call was made
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Geolocation failures
    #[error("Location error: {0}")]
    Location(LocationErrorKind),

    /// Backend API failures
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A platform capability (speech, geolocation) is absent
    #[error("{capability} is not supported on this platform")]
    CapabilityUnsupported { capability: &'static str },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl From<LocationErrorKind> for AccessNavError {
    fn from(kind: LocationErrorKind) -> Self {
        Self::Location(kind)
    }
}

impl AccessNavError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether retrying the same call later could succeed without user action.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Location(LocationErrorKind::Pending))
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            AccessNavError::Validation { message } => message.clone(),
            AccessNavError::Location(LocationErrorKind::Pending) => {
                "Getting your location...".to_string()
            }
            AccessNavError::Location(kind) => format!("Location Error: {kind}"),
            AccessNavError::Api(err) => err.message().to_string(),
            AccessNavError::CapabilityUnsupported { capability } => {
                format!("{capability} is not available on this system.")
            }
            AccessNavError::Config { message } => format!(
                "Configuration error: {message}. Please check your config file and environment."
            ),
            AccessNavError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
        }
    }
}
