//! One read-check-maybe-write cycle against the gateway.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, trace, warn};

use reroll_core::{
    AccountGateway, AttemptOutcome, Error, Phase, ProgressEvent, Result, TargetSet,
};

use crate::channel::ProgressSender;

/// Run a gateway call with a deadline, turning a panic into an error.
pub(crate) async fn guarded_call<T, F>(op: &'static str, deadline: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, AssertUnwindSafe(call).catch_unwind()).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => Err(Error::Internal(format!(
            "{} panicked: {}",
            op,
            panic_message(panic.as_ref())
        ))),
        Err(_) => Err(Error::Request(format!(
            "{} timed out after {}ms",
            op,
            deadline.as_millis()
        ))),
    }
}

// Both kinds still count as a failed tick; only the log level differs.
fn log_call_failure(attempt: u32, what: &str, err: &Error) {
    if err.is_transient() {
        warn!(attempt, error = %err, "{}", what);
    } else {
        error!(attempt, error = %err, "{}", what);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Performs single attempts; holds no per-search state.
#[derive(Clone)]
pub struct AttemptExecutor {
    gateway: Arc<dyn AccountGateway>,
    call_timeout: Duration,
}

impl AttemptExecutor {
    pub fn new(gateway: Arc<dyn AccountGateway>, call_timeout: Duration) -> Self {
        Self {
            gateway,
            call_timeout,
        }
    }

    /// Read the account, stop if its suffix is a target, otherwise request a
    /// change keeping the nickname.
    ///
    /// Makes exactly one read and at most one write. Emits `checking` after
    /// the read and `updating` before the write.
    pub async fn attempt(
        &self,
        token: &str,
        targets: &TargetSet,
        attempt: u32,
        progress: &ProgressSender,
    ) -> AttemptOutcome {
        if token.trim().is_empty() {
            return AttemptOutcome::AuthMissing;
        }

        let account = match guarded_call(
            "read_account",
            self.call_timeout,
            self.gateway.read_account(token),
        )
        .await
        {
            Ok(account) => account,
            Err(Error::Unauthorized(reason)) => return AttemptOutcome::AuthRejected { reason },
            Err(e) => {
                log_call_failure(attempt, "Account read failed", &e);
                return AttemptOutcome::FetchFailed {
                    reason: e.to_string(),
                };
            }
        };

        let name = account.parsed_display_name();
        trace!(attempt, display_name = %account.display_name, "Account read");

        progress.emit(ProgressEvent::Status {
            attempt,
            phase: Phase::Checking,
            current_discriminator: Some(name.discriminator.clone()),
        });

        if targets.contains(&name.discriminator) {
            debug!(attempt, discriminator = %name.discriminator, "Discriminator matched");
            return AttemptOutcome::Matched {
                display_name: account.display_name,
                discriminator: name.discriminator,
            };
        }

        progress.emit(ProgressEvent::Status {
            attempt,
            phase: Phase::Updating,
            current_discriminator: None,
        });

        match guarded_call(
            "change_display_name",
            self.call_timeout,
            self.gateway.change_display_name(token, &name.nickname),
        )
        .await
        {
            Ok(_) => {
                debug!(attempt, discriminator = %name.discriminator, "Change submitted");
                AttemptOutcome::UpdatedNoMatch {
                    discriminator: name.discriminator,
                }
            }
            Err(Error::Unauthorized(reason)) => AttemptOutcome::AuthRejected { reason },
            Err(e) => {
                log_call_failure(attempt, "Display name change failed", &e);
                AttemptOutcome::UpdateFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
