//! `POST /api/change-displayname`: start a search and stream its progress.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};

use reroll_core::{Credentials, SearchRequest, TargetSet};
use reroll_search::encode_line;

use crate::error::ApiError;
use crate::state::AppState;

/// Accepts either `"1234, 0420"` or `["1234", "0420"]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Discriminators {
    List(Vec<String>),
    Csv(String),
}

impl Default for Discriminators {
    fn default() -> Self {
        Discriminators::Csv(String::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDisplayNameBody {
    pub email: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    #[serde(default)]
    pub discriminators: Discriminators,
    #[serde(default)]
    pub match_any_repeated_digit: bool,
    pub interval_ms: Option<u64>,
}

impl ChangeDisplayNameBody {
    fn into_request(self) -> reroll_core::Result<SearchRequest> {
        let targets = match &self.discriminators {
            Discriminators::Csv(list) => TargetSet::parse(list, self.match_any_repeated_digit)?,
            Discriminators::List(values) => {
                TargetSet::from_values(values, self.match_any_repeated_digit)?
            }
        };
        let credentials = Credentials::resolve(
            self.email.as_deref(),
            self.password.as_deref(),
            self.token.as_deref(),
        )?;

        let request = SearchRequest::new(credentials, targets);
        Ok(match self.interval_ms {
            Some(ms) => request.with_base_interval_ms(ms),
            None => request,
        })
    }
}

pub async fn change_display_name(
    State(state): State<AppState>,
    body: Result<Json<ChangeDisplayNameBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let request = body.into_request().map_err(bad_request)?;
    let target_count = request.targets.len();

    // Only well-formed requests consume a rate limit cell.
    if !state.allow_search() {
        warn!(target_count, "Search start rate limited");
        return Err(ApiError::RateLimited);
    }

    let stream = state
        .orchestrator
        .start_search(request)
        .map_err(bad_request)?;
    let search_id = stream.search_id();

    info!(%search_id, target_count, "Streaming search progress");

    let lines = stream.map(|event| encode_line(&event));
    let mut response = (StatusCode::OK, Body::from_stream(lines)).into_response();

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Ok(value) = HeaderValue::from_str(&search_id.to_string()) {
        headers.insert("x-search-id", value);
    }

    Ok(response)
}

// Input problems are always 400 here, including credential shape errors.
fn bad_request(err: reroll_core::Error) -> ApiError {
    match err {
        reroll_core::Error::Validation(msg) => ApiError::BadRequest(msg),
        other => ApiError::BadRequest(other.to_string()),
    }
}
