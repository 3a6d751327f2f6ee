//! Entry point for starting searches.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use reroll_core::{
    new_v7, AccountGateway, Credentials, Error, Phase, ProgressEvent, Result, SearchRequest,
};

use crate::channel::{progress_channel, ProgressSender, ProgressStream};
use crate::config::SearchConfig;
use crate::controller::SearchController;
use crate::executor::{guarded_call, AttemptExecutor};

/// Starts independent searches that share one gateway client.
#[derive(Clone)]
pub struct SearchOrchestrator {
    gateway: Arc<dyn AccountGateway>,
    config: SearchConfig,
}

impl SearchOrchestrator {
    pub fn new(gateway: Arc<dyn AccountGateway>, config: SearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { gateway, config })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<dyn AccountGateway> {
        &self.gateway
    }

    /// Validate the request and spawn its search.
    ///
    /// Invalid input is rejected here, before any network call. Everything
    /// after that, including credential failures, arrives on the returned
    /// stream. Must be called from within a tokio runtime.
    pub fn start_search(&self, request: SearchRequest) -> Result<ProgressStream> {
        if request.targets.is_empty() {
            return Err(Error::Validation(
                "Discriminators field is invalid".to_string(),
            ));
        }

        let base_interval_ms = self.config.effective_interval_ms(request.base_interval_ms)?;

        let search_id = new_v7();
        let cancel = CancellationToken::new();
        let (progress, stream) = progress_channel(search_id, cancel.clone());

        let executor = AttemptExecutor::new(self.gateway.clone(), self.config.call_timeout());
        let controller = SearchController::new(executor, self.config.clone(), cancel.clone());
        let gateway = self.gateway.clone();
        let call_timeout = self.config.call_timeout();

        let span = info_span!("search", %search_id);
        tokio::spawn(
            async move {
                let started_at = Instant::now();

                let resolved = resolve_token(
                    gateway.as_ref(),
                    request.credentials,
                    call_timeout,
                    &progress,
                )
                .await;

                let token = match resolved {
                    Ok(token) if !cancel.is_cancelled() => token,
                    Ok(_) => return end_early(progress, Error::Cancelled, started_at),
                    Err(_) if cancel.is_cancelled() => {
                        return end_early(progress, Error::Cancelled, started_at)
                    }
                    Err(e) => return end_early(progress, e, started_at),
                };

                controller
                    .run(token, request.targets, base_interval_ms, started_at, progress)
                    .await;
            }
            .instrument(span),
        );

        info!(%search_id, "Search spawned");
        Ok(stream)
    }

    /// Start a search and wait for its terminal event.
    pub async fn run_to_completion(&self, request: SearchRequest) -> Result<ProgressEvent> {
        let mut stream = self.start_search(request)?;
        let mut last = None;
        while let Some(event) = stream.next().await {
            last = Some(event);
        }
        last.filter(ProgressEvent::is_terminal)
            .ok_or_else(|| Error::Internal("Search ended without a terminal event".to_string()))
    }
}

/// Exchange credentials for a bearer token, announcing the
/// `authenticating` phase when a login call is needed.
async fn resolve_token(
    gateway: &dyn AccountGateway,
    credentials: Credentials,
    call_timeout: Duration,
    progress: &ProgressSender,
) -> Result<String> {
    let (email, password) = match credentials {
        Credentials::Token(token) => return Ok(token),
        Credentials::Password { email, password } => (email, password),
    };

    progress.emit(ProgressEvent::Status {
        attempt: 0,
        phase: Phase::Authenticating,
        current_discriminator: None,
    });

    let token = guarded_call(
        "authenticate",
        call_timeout,
        gateway.authenticate(&email, &password),
    )
    .await?;

    if token.trim().is_empty() {
        return Err(Error::Gateway("Token cannot be fetched".to_string()));
    }

    info!("Authenticated");
    Ok(token)
}

/// Terminate a search that never reached its first attempt.
fn end_early(progress: ProgressSender, reason: Error, started_at: Instant) {
    let duration_ms = started_at.elapsed().as_millis() as u64;
    match reason {
        Error::Cancelled => info!(duration_ms, "Search cancelled"),
        ref e => error!(error = %e, fatal = true, duration_ms, "Search failed before first attempt"),
    }
    progress.finish(ProgressEvent::fatal(reason.to_string(), 0, duration_ms));
}
