//! Server configuration from the environment.

use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use reroll_core::defaults::{RATE_LIMIT_PERIOD_SECS, RATE_LIMIT_REQUESTS, SERVER_PORT};

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<HeaderValue>,
    pub rate_limit_enabled: bool,
    /// Search starts allowed per period.
    pub rate_limit_requests: u64,
    pub rate_limit_period_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: SERVER_PORT,
            allowed_origins: parse_allowed_origins(DEFAULT_ALLOWED_ORIGINS),
            rate_limit_enabled: true,
            rate_limit_requests: RATE_LIMIT_REQUESTS,
            rate_limit_period_secs: RATE_LIMIT_PERIOD_SECS,
        }
    }
}

impl ServerConfig {
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` | `0.0.0.0` | Bind address |
    /// | `PORT` | `3000` | Bind port |
    /// | `ALLOWED_ORIGINS` | `http://localhost:3000` | Comma-separated CORS origins |
    /// | `RATE_LIMIT_ENABLED` | `true` | Throttle search starts |
    /// | `RATE_LIMIT_REQUESTS` | `10` | Search starts per period |
    /// | `RATE_LIMIT_PERIOD_SECS` | `60` | Rate limit period |
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(d.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.port),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .map(|v| parse_allowed_origins(&v))
                .ok()
                .filter(|o| !o.is_empty())
                .unwrap_or(d.allowed_origins),
            rate_limit_enabled: std::env::var("RATE_LIMIT_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(d.rate_limit_enabled),
            rate_limit_requests: std::env::var("RATE_LIMIT_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.rate_limit_requests),
            rate_limit_period_secs: std::env::var("RATE_LIMIT_PERIOD_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.rate_limit_period_secs),
        }
    }

    pub fn rate_limit_period(&self) -> Duration {
        Duration::from_secs(self.rate_limit_period_secs)
    }

    pub fn cors_layer(&self) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(self.allowed_origins.clone()))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    }
}

/// Parse a comma-separated origin list, skipping blanks and invalid values.
pub fn parse_allowed_origins(origins: &str) -> Vec<HeaderValue> {
    origins
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}
