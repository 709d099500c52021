//! Unified error handling for the tgcollect crate
//!
//! Domain-specific errors ([`SessionError`], [`CollectError`], [`ApiError`])
//! stay close to the modules that raise them; this module consolidates them
//! into a single [`Error`] enum with a coarse [`ErrorCategory`] that the
//! orchestration boundary uses to decide how a failure is reported.

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::collect::api::ApiError;
pub use crate::collect::CollectError;
pub use crate::session::SessionError;

/// Classification of errors for reporting and handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing environment pieces (browser binary, session snapshot)
    Environment,
    /// Network, page-load and endpoint errors
    Network,
    /// Classified search-API failures
    Api,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unexpected errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::Network => "network",
            Self::Api => "api",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the tgcollect crate
#[derive(Error, Debug)]
pub enum Error {
    /// Session capture/replay errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Collection strategy errors
    #[error("Collection error: {0}")]
    Collect(#[from] CollectError),

    /// Search API errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Get the error category for reporting strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Session(e) => match e {
                SessionError::DebuggerUnreachable(_) => ErrorCategory::Network,
                _ => ErrorCategory::Environment,
            },
            Self::Collect(e) => match e {
                CollectError::Driver(_) => ErrorCategory::Other,
                _ => ErrorCategory::Network,
            },
            Self::Api(_) => ErrorCategory::Api,
            Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Http(_) => ErrorCategory::Network,
            Self::Json(_) => ErrorCategory::Other,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other(_) => ErrorCategory::Other,
        }
    }

    /// Check if this error is recoverable (a later run may succeed without
    /// operator action)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Session(_) => false,
            Self::Collect(e) => !matches!(e, CollectError::Driver(_)),
            Self::Api(e) => matches!(e, ApiError::RateLimited | ApiError::NotFound),
            Self::Database(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Http(_) => true,
            Self::Config(_) => false,
            Self::Other(_) => false,
        }
    }
}

// Conversion from rusqlite::Error
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_category() {
        let missing = Error::Session(SessionError::SnapshotMissing(PathBuf::from("x.json")));
        assert_eq!(missing.category(), ErrorCategory::Environment);

        let timeout = Error::Collect(CollectError::PageLoad("timeout".to_string()));
        assert_eq!(timeout.category(), ErrorCategory::Network);

        let limited = Error::Api(ApiError::RateLimited);
        assert_eq!(limited.category(), ErrorCategory::Api);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::Collect(CollectError::ContentWait("slow feed".to_string())).is_recoverable());
        assert!(Error::Api(ApiError::RateLimited).is_recoverable());
        assert!(!Error::Api(ApiError::Unauthorized).is_recoverable());
        assert!(!Error::Session(SessionError::SnapshotMissing(PathBuf::from("x"))).is_recoverable());
        assert!(!Error::Collect(CollectError::Driver("gone".to_string())).is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let session: Error = SessionError::SnapshotMissing(PathBuf::from("x")).into();
        assert!(matches!(session, Error::Session(_)));

        let wrapped: Error = anyhow::anyhow!("context lost").into();
        assert!(matches!(wrapped, Error::Other(_)));
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("invalid rate limit");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }
}
