//! Apex-specific error classification.

use reroll_core::defaults::GATEWAY_UNAUTHORIZED;
use reroll_core::Error;

/// Error classes the Apex gateway can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApexErrorCode {
    /// Credentials or token rejected.
    Unauthorized,
    /// Too many requests.
    RateLimited,
    /// Request understood and refused (bad nickname, validation).
    Rejected,
    /// Server error.
    ServerError,
    /// Anything else, including error documents on a 2xx response.
    Unknown,
}

impl ApexErrorCode {
    /// Determine error code from HTTP status and the `error` field of the body.
    pub fn from_response(status: u16, error: &str) -> Self {
        match (status, error) {
            (401, _) | (_, GATEWAY_UNAUTHORIZED) => Self::Unauthorized,
            (429, _) => Self::RateLimited,
            (500..=599, _) => Self::ServerError,
            (400..=499, _) => Self::Rejected,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::ServerError | Self::Unknown)
    }
}

/// Convert an Apex error to a reroll Error.
pub fn to_reroll_error(code: ApexErrorCode, message: &str) -> Error {
    match code {
        ApexErrorCode::Unauthorized => Error::Unauthorized(message.to_string()),
        ApexErrorCode::RateLimited => Error::Gateway(format!("Rate limited: {}", message)),
        ApexErrorCode::Rejected => Error::Gateway(format!("Rejected: {}", message)),
        ApexErrorCode::ServerError => Error::Gateway(format!("Server error: {}", message)),
        ApexErrorCode::Unknown => Error::Gateway(message.to_string()),
    }
}
