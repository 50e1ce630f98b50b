//! Error types for netfirst.
//!
//! Network failures are an expected condition for this crate: the interceptor
//! turns them into a cache lookup instead of surfacing them. Everything else is
//! reported through [`NetfirstError`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the netfirst library.
#[derive(Debug, Error)]
pub enum NetfirstError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // Lifecycle errors
    #[error("Invalid worker state transition from {from} to {to}")]
    InvalidState { from: String, to: String },

    #[error("Background task failed: {0}")]
    Task(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for netfirst operations.
pub type Result<T> = std::result::Result<T, NetfirstError>;

impl From<std::io::Error> for NetfirstError {
    fn from(err: std::io::Error) -> Self {
        NetfirstError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for NetfirstError {
    fn from(err: serde_json::Error) -> Self {
        NetfirstError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for NetfirstError {
    fn from(err: rusqlite::Error) -> Self {
        NetfirstError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for NetfirstError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetfirstError::Timeout(std::time::Duration::from_secs(0))
        } else {
            NetfirstError::Network {
                message: err.to_string(),
                cause: std::error::Error::source(&err).map(|s| s.to_string()),
            }
        }
    }
}

impl From<url::ParseError> for NetfirstError {
    fn from(err: url::ParseError) -> Self {
        NetfirstError::InvalidRequest {
            message: format!("Invalid URL: {}", err),
        }
    }
}

impl From<tokio::task::JoinError> for NetfirstError {
    fn from(err: tokio::task::JoinError) -> Self {
        NetfirstError::Task(err.to_string())
    }
}

impl NetfirstError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        NetfirstError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a database error for a poisoned connection lock.
    pub(crate) fn lock_poisoned(what: impl std::fmt::Display) -> Self {
        NetfirstError::Database {
            message: format!("Failed to lock database: {}", what),
            source: None,
        }
    }

    /// Whether this error means the network could not produce a response.
    ///
    /// These are the failures that send the interceptor to the cache.
    pub fn is_network_failure(&self) -> bool {
        matches!(
            self,
            NetfirstError::Network { .. } | NetfirstError::Timeout(_)
        )
    }
}
