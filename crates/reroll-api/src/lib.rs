//! # reroll-api
//!
//! HTTP front end for the discriminator search.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `POST /api/change-displayname` | Start a search; NDJSON progress stream |
//! | `POST /api/authorize` | Exchange email/password for a token |
//! | `POST /api/account-details` | Read the account behind credentials |
//! | `GET /health` | Liveness and version |

use axum::http::Request;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use reroll_core::defaults::REQUEST_BODY_LIMIT;

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use state::AppState;

/// Request ids are UUIDv7 so they sort with the search ids in logs.
#[derive(Clone, Copy, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = reroll_core::new_v7().to_string();
        id.parse().ok().map(RequestId::new)
    }
}

/// Build the router without CORS; the binary adds it from [`ServerConfig`].
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/change-displayname",
            post(handlers::search::change_display_name),
        )
        .route("/api/authorize", post(handlers::account::authorize))
        .route("/api/account-details", post(handlers::account::account_details))
        .route("/health", get(handlers::health::health_check))
        .layer(RequestBodyLimitLayer::new(REQUEST_BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .with_state(state)
}
