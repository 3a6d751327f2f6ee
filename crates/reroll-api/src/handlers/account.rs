//! Token exchange and account lookup helpers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use reroll_core::{Credentials, Error};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuthorizeBody {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccountDetailsBody {
    pub email: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

/// `POST /api/authorize`: exchange email/password for a token.
pub async fn authorize(
    State(state): State<AppState>,
    body: Result<Json<AuthorizeBody>, JsonRejection>,
) -> Result<Json<JsonValue>, ApiError> {
    let Json(body) = body?;

    let email = body.email.as_deref().map(str::trim).unwrap_or_default();
    if email.is_empty() {
        return Err(ApiError::BadRequest("Email is required".to_string()));
    }
    let password = body.password.as_deref().unwrap_or_default();
    if password.trim().is_empty() {
        return Err(ApiError::BadRequest("Password is required".to_string()));
    }

    let token = state
        .orchestrator
        .gateway()
        .authenticate(email, password)
        .await
        .map_err(|e| ApiError::BadRequest(login_message(e)))?;

    debug!("Token issued");
    Ok(Json(json!({ "token": token })))
}

/// `POST /api/account-details`: read the account behind a token or
/// email/password pair.
pub async fn account_details(
    State(state): State<AppState>,
    body: Result<Json<AccountDetailsBody>, JsonRejection>,
) -> Result<Json<JsonValue>, ApiError> {
    let Json(body) = body?;
    let credentials = Credentials::resolve(
        body.email.as_deref(),
        body.password.as_deref(),
        body.token.as_deref(),
    )
    .map_err(|e| match e {
        Error::Validation(msg) => ApiError::BadRequest(msg),
        other => ApiError::BadRequest(other.to_string()),
    })?;

    let gateway = state.orchestrator.gateway();
    let token = match credentials {
        Credentials::Token(token) => token,
        Credentials::Password { email, password } => gateway
            .authenticate(&email, &password)
            .await
            .map_err(|e| ApiError::BadRequest(login_message(e)))?,
    };

    let account = gateway.read_account(&token).await.map_err(|e| match e {
        Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
        other => ApiError::BadRequest(other.to_string()),
    })?;

    Ok(Json(json!({ "account": account })))
}

// Login failures report the bare reason, e.g. "Invalid credentials".
fn login_message(err: Error) -> String {
    match err {
        Error::Unauthorized(msg) | Error::Gateway(msg) => msg,
        other => other.to_string(),
    }
}
