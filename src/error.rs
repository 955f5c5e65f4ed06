//! Error types for the issue-tracker library.
//!
//! This module provides custom error types using `thiserror` for better error handling
//! and more specific error messages throughout the application.

use thiserror::Error;

/// Errors that can occur in the issue-tracker application.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Caller supplied a missing, malformed, or unrecognized value
    #[error("Validation error: {0}")]
    Validation(String),

    /// A mutation or lookup referenced an identifier that does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record that was looked up
        entity: &'static str,
        /// Identifier (or period key) that was requested
        id: String,
    },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV rendering errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A blocking store task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with `TrackerError`
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Machine-readable classification carried by every error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 4xx: bad input
    Validation,
    /// 4xx: missing record
    NotFound,
    /// 5xx: the store failed
    Store,
    /// 5xx: anything else
    Internal,
}

impl ErrorKind {
    /// Wire label for this kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::NotFound => "not_found",
            Self::Store => "store_error",
            Self::Internal => "internal_error",
        }
    }
}

impl TrackerError {
    /// Shorthand for a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for a missing record
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classify this error for the request boundary
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Database(_) | Self::Pool(_) => ErrorKind::Store,
            Self::Io(_)
            | Self::Serialization(_)
            | Self::Csv(_)
            | Self::InvalidConfig(_)
            | Self::Task(_)
            | Self::Other(_) => ErrorKind::Internal,
        }
    }
}

impl From<anyhow::Error> for TrackerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<tokio::task::JoinError> for TrackerError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(TrackerError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(TrackerError::not_found("Issue", 4).kind(), ErrorKind::NotFound);
        assert_eq!(
            TrackerError::Database(rusqlite::Error::QueryReturnedNoRows).kind(),
            ErrorKind::Store
        );
        assert_eq!(TrackerError::Other("x".into()).kind().as_str(), "internal_error");
    }

    #[test]
    fn test_not_found_message() {
        let err = TrackerError::not_found("Comment", 12);
        assert_eq!(err.to_string(), "Comment not found: 12");
    }
}
