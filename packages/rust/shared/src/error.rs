//! Error types for incidentqa.
//!
//! Library crates use [`IncidentQaError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all incidentqa operations.
#[derive(Debug, thiserror::Error)]
pub enum IncidentQaError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A required credential is missing from the environment.
    #[error("credentials error: {message}")]
    Credentials { message: String },

    /// Transport-level failure talking to a backend.
    #[error("network error: {0}")]
    Network(String),

    /// A backend answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// A backend or completion payload did not have the expected shape.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Completion service error (transport, API, or empty response).
    #[error("completion error: {0}")]
    Completion(String),

    /// An operation did not finish within its bound.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid state or input.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, IncidentQaError>;

impl IncidentQaError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a credentials error from any displayable message.
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = IncidentQaError::credentials("SPLUNK_PASSWORD is not set");
        assert_eq!(
            err.to_string(),
            "credentials error: SPLUNK_PASSWORD is not set"
        );

        let err = IncidentQaError::Http {
            status: 404,
            url: "http://localhost/content/search".into(),
        };
        assert!(err.to_string().starts_with("HTTP 404"));
    }
}
