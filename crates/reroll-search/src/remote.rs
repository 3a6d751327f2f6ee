//! Client for a search running on a reroll-api server.
//!
//! The server streams NDJSON progress. If the connection ends before a
//! terminal event, [`RemoteSearch::run`] waits and issues a fresh search,
//! up to `max_reconnects` times.

use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, warn};

use reroll_core::{Error, ProgressEvent, Result};

use crate::ndjson::NdjsonDecoder;

const SEARCH_PATH: &str = "/api/change-displayname";

/// Body of `POST /api/change-displayname`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub discriminators: String,
    pub match_any_repeated_digit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RemoteSearch {
    client: reqwest::Client,
    url: String,
    max_reconnects: u32,
    reconnect_delay: Duration,
}

impl RemoteSearch {
    pub fn new(server: &str, max_reconnects: u32, reconnect_delay: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}{}", server.trim_end_matches('/'), SEARCH_PATH),
            max_reconnects,
            reconnect_delay,
        }
    }

    /// Run a search to its terminal event, handing every event to
    /// `on_event` as it arrives.
    ///
    /// A request the server refuses (non-2xx) is returned as an error without
    /// retrying. A send failure or a stream that ends early counts as a
    /// dropped connection.
    pub async fn run<F>(&self, request: &RemoteSearchRequest, mut on_event: F) -> Result<ProgressEvent>
    where
        F: FnMut(&ProgressEvent),
    {
        for round in 0..=self.max_reconnects {
            if round > 0 {
                warn!(
                    round,
                    delay_ms = self.reconnect_delay.as_millis() as u64,
                    "Connection dropped, issuing a fresh search"
                );
                tokio::time::sleep(self.reconnect_delay).await;
            }

            let response = match self.client.post(&self.url).json(request).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "Search request failed");
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(refusal(status.as_u16(), &text));
            }

            if let Some(terminal) = follow(response, &mut on_event).await? {
                return Ok(terminal);
            }
        }

        Err(Error::Request(format!(
            "Gave up after {} reconnect attempts without a final result",
            self.max_reconnects
        )))
    }
}

/// Forward events until the terminal one. `None` means the transport ended
/// first.
async fn follow<F>(response: reqwest::Response, on_event: &mut F) -> Result<Option<ProgressEvent>>
where
    F: FnMut(&ProgressEvent),
{
    let mut decoder = NdjsonDecoder::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "Progress stream interrupted");
                return Ok(None);
            }
        };
        for event in decoder.push(&chunk)? {
            on_event(&event);
            if event.is_terminal() {
                return Ok(Some(event));
            }
        }
    }

    if decoder.has_pending() {
        debug!("Progress stream ended mid-line");
    }
    match decoder.finish() {
        Ok(Some(event)) => {
            on_event(&event);
            Ok(event.is_terminal().then_some(event))
        }
        Ok(None) => Ok(None),
        // A cut-off final line is a dropped connection, not a protocol error.
        Err(_) => Ok(None),
    }
}

fn refusal(status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string());

    match status {
        400 => Error::Validation(message),
        401 => Error::Unauthorized(message),
        _ => Error::Gateway(format!("Server refused the search ({}): {}", status, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(RemoteSearchRequest {
            token: Some("T".into()),
            discriminators: "1234".into(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "token": "T",
                "discriminators": "1234",
                "matchAnyRepeatedDigit": false,
            })
        );
    }

    #[test]
    fn test_refusal_mapping() {
        assert!(matches!(
            refusal(400, r#"{"error":"Discriminators field is invalid"}"#),
            Error::Validation(msg) if msg == "Discriminators field is invalid"
        ));
        assert!(matches!(refusal(401, "{}"), Error::Unauthorized(_)));
        let err = refusal(429, r#"{"error":"Too many requests"}"#);
        assert!(err.to_string().contains("(429)"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn test_url_joins_server_and_path() {
        let remote = RemoteSearch::new("http://localhost:3000/", 0, Duration::ZERO);
        assert_eq!(remote.url, "http://localhost:3000/api/change-displayname");
    }
}
