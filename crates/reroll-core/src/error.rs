//! Error types for reroll.

use thiserror::Error;

/// Result type alias using reroll's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for reroll operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Request input was rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Token missing, expired, or credentials rejected by the gateway
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The gateway answered with an error document or a non-success status
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Attempt ceiling reached without a match
    #[error("Maximum attempts reached ({0})")]
    Exhausted(u32),

    /// Consecutive-error ceiling reached
    #[error("Too many consecutive errors ({count}): {last}")]
    ConsecutiveFailures { count: u32, last: String },

    /// The search was cancelled before it finished
    #[error("Search cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a retry of the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Gateway(_) | Error::Request(_) | Error::Serialization(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("Discriminators field is invalid".to_string());
        assert_eq!(
            err.to_string(),
            "Validation error: Discriminators field is invalid"
        );
    }

    #[test]
    fn test_error_display_unauthorized() {
        let err = Error::Unauthorized("Invalid credentials".to_string());
        assert_eq!(err.to_string(), "Unauthorized: Invalid credentials");
    }

    #[test]
    fn test_error_display_exhausted() {
        let err = Error::Exhausted(3000);
        assert_eq!(err.to_string(), "Maximum attempts reached (3000)");
    }

    #[test]
    fn test_error_display_consecutive_failures() {
        let err = Error::ConsecutiveFailures {
            count: 3,
            last: "Gateway error: 503".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Too many consecutive errors (3): Gateway error: 503"
        );
    }

    #[test]
    fn test_error_display_cancelled() {
        assert_eq!(Error::Cancelled.to_string(), "Search cancelled");
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Gateway("503".into()).is_transient());
        assert!(Error::Request("connection reset".into()).is_transient());
        assert!(Error::Serialization("bad json".into()).is_transient());
        assert!(!Error::Unauthorized("expired".into()).is_transient());
        assert!(!Error::Validation("bad".into()).is_transient());
        assert!(!Error::Cancelled.is_transient());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
