//! Apex Connect HTTP gateway.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use reroll_core::defaults::{GATEWAY_BASE_URL, GATEWAY_TIMEOUT_SECS};
use reroll_core::{Account, AccountGateway, Error, Result};

use crate::error::{to_reroll_error, ApexErrorCode};
use crate::types::*;

const LOGIN_PATH: &str = "/portal/default/login";
const ACCOUNT_PATH: &str = "/api/v1/account";
const CHANGE_NICK_NAME_PATH: &str = "/api/v1/account/change_nick_name";

const AUTH_HEADER: &str = "x-ava-authorization";
const ACCEPT: &str = "application/json, text/plain, */*";

/// Configuration for the Apex gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the account service.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// User-Agent header (reqwest's default when unset).
    pub user_agent: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: GATEWAY_BASE_URL.to_string(),
            timeout_seconds: GATEWAY_TIMEOUT_SECS,
            user_agent: None,
        }
    }
}

impl GatewayConfig {
    /// Load from `APEX_BASE_URL`, `APEX_TIMEOUT_SECS` and `APEX_USER_AGENT`.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("APEX_BASE_URL")
                .unwrap_or_else(|_| GATEWAY_BASE_URL.to_string()),
            timeout_seconds: std::env::var("APEX_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(GATEWAY_TIMEOUT_SECS),
            user_agent: std::env::var("APEX_USER_AGENT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// [`AccountGateway`] backed by the Apex Connect REST API.
pub struct ApexGateway {
    client: Client,
    config: GatewayConfig,
}

impl ApexGateway {
    /// Create a new gateway with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let mut client_builder =
            Client::builder().timeout(Duration::from_secs(config.timeout_seconds));

        if let Some(ref user_agent) = config.user_agent {
            client_builder = client_builder.user_agent(user_agent.clone());
        }

        let client = client_builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            base_url = %config.base_url,
            timeout_secs = config.timeout_seconds,
            "Initializing Apex gateway"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(GatewayConfig::from_env())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn build_get_request(&self, path: &str, token: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .header("accept", ACCEPT)
            .header(AUTH_HEADER, format!("Bearer {}", token))
    }

    fn build_post_request(&self, path: &str, token: Option<&str>) -> RequestBuilder {
        let mut req = self.client.post(self.url(path)).header("accept", ACCEPT);

        if let Some(token) = token {
            req = req.header(AUTH_HEADER, format!("Bearer {}", token));
        }

        req
    }

    /// Send a request and decode its payload.
    ///
    /// An `error` field in the body wins over the HTTP status; Apex sometimes
    /// answers 200 with `{"error": "Unauthorized"}`.
    async fn send<T: DeserializeOwned>(&self, op: &'static str, req: RequestBuilder) -> Result<T> {
        let start = Instant::now();

        let response = req
            .send()
            .await
            .map_err(|e| Error::Request(format!("{} request failed: {}", op, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Request(format!("{} response unreadable: {}", op, e)))?;

        debug!(
            op,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Gateway call finished"
        );

        if let Some(message) = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
        {
            let code = ApexErrorCode::from_response(status.as_u16(), &message);
            log_failure(op, status.as_u16(), code, &message);
            return Err(to_reroll_error(code, &message));
        }

        if !status.is_success() {
            let code = ApexErrorCode::from_response(status.as_u16(), "");
            let message = format!("{} returned {}", op, status);
            log_failure(op, status.as_u16(), code, &message);
            return Err(to_reroll_error(code, &message));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::Serialization(format!("Failed to parse {} response: {}", op, e)))
    }
}

// Retryable codes are expected under load; the rest point at the request.
fn log_failure(op: &'static str, status: u16, code: ApexErrorCode, message: &str) {
    if code.is_retryable() {
        warn!(op, status, ?code, error = %message, "Gateway returned retryable error");
    } else {
        info!(op, status, ?code, error = %message, "Gateway refused request");
    }
}

#[async_trait]
impl AccountGateway for ApexGateway {
    async fn authenticate(&self, email: &str, password: &str) -> Result<String> {
        debug!(email, "Requesting token");

        let req = self
            .build_post_request(LOGIN_PATH, None)
            .json(&LoginRequest { email, password });

        let response: LoginResponse = self.send("login", req).await.map_err(|e| match e {
            Error::Unauthorized(_) => Error::Unauthorized("Invalid credentials".to_string()),
            other => other,
        })?;

        response
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Gateway("Token cannot be fetched".to_string()))
    }

    async fn read_account(&self, token: &str) -> Result<Account> {
        let req = self.build_get_request(ACCOUNT_PATH, token);
        let response: AccountResponse = self.send("read_account", req).await?;

        trace!(display_name = %response.account.display_name, "Account read");
        Ok(response.account)
    }

    async fn change_display_name(&self, token: &str, nickname: &str) -> Result<String> {
        let req = self
            .build_post_request(CHANGE_NICK_NAME_PATH, Some(token))
            .json(&ChangeNickNameRequest {
                nick_name: nickname,
            });

        let response: ChangeNickNameResponse = self.send("change_display_name", req).await?;

        trace!(nick_name = ?response.nick_name, "Display name change acknowledged");
        Ok(response.nick_name.unwrap_or_else(|| nickname.to_string()))
    }
}
