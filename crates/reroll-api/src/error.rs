//! HTTP error mapping. Every error body is `{"error": "<message>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    RateLimited,
    BadGateway(String),
    Internal(String),
}

impl From<reroll_core::Error> for ApiError {
    fn from(err: reroll_core::Error) -> Self {
        use reroll_core::Error;
        match err {
            Error::Validation(msg) => ApiError::BadRequest(msg),
            Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            Error::Gateway(_) | Error::Request(_) | Error::Serialization(_) => {
                ApiError::BadGateway(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests. Please wait before retrying.".to_string(),
            ),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
