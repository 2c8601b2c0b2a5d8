//! Unified error handling for the tracker.
//!
//! Every fallible operation in the crate returns [`Result`]. Variants carry
//! enough context to build a user-facing message, and [`TrackerError::http_status`]
//! gives the status code a REST layer should answer with.

use thiserror::Error;

/// Unified error type for tracking operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// No session with this id exists (or it is not visible to the caller)
    #[error("Session '{session_id}' not found")]
    SessionNotFound { session_id: String },

    /// The session exists but belongs to another user
    #[error("Session '{session_id}' is not owned by user '{user_id}'")]
    Forbidden { session_id: String, user_id: String },

    /// Upload exceeds the per-batch point limit
    #[error("Batch has {count} points, maximum {max} allowed")]
    BatchTooLarge { count: usize, max: usize },

    /// A fix in the batch carries malformed metadata
    #[error("Fix {index} is invalid: {message}")]
    InvalidFix { index: usize, message: String },

    /// Generic request validation failure
    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    /// Status change not allowed from the current status
    #[error("Session '{session_id}' cannot go from {from} to {to}")]
    InvalidTransition {
        session_id: String,
        from: String,
        to: String,
    },

    /// Points were uploaded to a completed or cancelled session
    #[error("Session '{session_id}' is {status} and no longer accepts points")]
    SessionClosed { session_id: String, status: String },

    /// Remote product API failure
    #[error("HTTP error{}: {message}", status_suffix(.status_code))]
    Http {
        message: String,
        status_code: Option<u16>,
    },

    /// The global tracker has not been initialized
    #[error("Tracker not initialized")]
    NotInitialized,

    /// An earlier call panicked while holding the global tracker
    #[error("Tracker lock poisoned")]
    LockPoisoned,

    #[cfg(feature = "persistence")]
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrackerError {
    /// HTTP status code matching this error.
    pub fn http_status(&self) -> u16 {
        match self {
            TrackerError::SessionNotFound { .. } => 404,
            TrackerError::Forbidden { .. } => 403,
            TrackerError::BatchTooLarge { .. }
            | TrackerError::InvalidFix { .. }
            | TrackerError::InvalidInput { .. } => 422,
            TrackerError::InvalidTransition { .. } | TrackerError::SessionClosed { .. } => 409,
            TrackerError::Http { .. } => 502,
            _ => 500,
        }
    }

    pub(crate) fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        TrackerError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

fn status_suffix(status_code: &Option<u16>) -> String {
    status_code.map(|code| format!(" ({code})")).unwrap_or_default()
}

/// Result type alias for tracking operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Extension trait for converting `Option` into a [`TrackerError`].
pub trait OptionExt<T> {
    /// Convert `None` into a session-not-found error.
    fn ok_or_session_not_found(self, session_id: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_session_not_found(self, session_id: &str) -> Result<T> {
        self.ok_or_else(|| TrackerError::SessionNotFound {
            session_id: session_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrackerError::BatchTooLarge {
            count: 1200,
            max: 1000,
        };
        assert!(err.to_string().contains("1200 points"));

        let err = TrackerError::Http {
            message: "upstream down".to_string(),
            status_code: Some(503),
        };
        assert_eq!(err.to_string(), "HTTP error (503): upstream down");
    }

    #[test]
    fn test_http_status_mapping() {
        let not_found = TrackerError::SessionNotFound {
            session_id: "s".to_string(),
        };
        assert_eq!(not_found.http_status(), 404);

        let closed = TrackerError::SessionClosed {
            session_id: "s".to_string(),
            status: "completed".to_string(),
        };
        assert_eq!(closed.http_status(), 409);
        assert_eq!(TrackerError::NotInitialized.http_status(), 500);
        assert_eq!(TrackerError::LockPoisoned.http_status(), 500);
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_session_not_found("abc");
        assert!(matches!(
            result,
            Err(TrackerError::SessionNotFound { ref session_id }) if session_id == "abc"
        ));
    }
}
