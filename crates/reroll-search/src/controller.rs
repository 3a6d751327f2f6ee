//! Retry/backoff controller: the per-search state machine and its tick loop.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use reroll_core::{AttemptOutcome, Error, Phase, ProgressEvent, TargetSet};

use crate::channel::ProgressSender;
use crate::config::SearchConfig;
use crate::executor::AttemptExecutor;

/// Lifecycle of one search. Terminal states absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl ControllerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

/// What the loop does after a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Emit the event, sleep, run the next tick.
    Continue { event: ProgressEvent, delay: Duration },
    /// Send the terminal event and stop.
    Stop(ProgressEvent),
}

/// Mutable per-search bookkeeping.
#[derive(Debug, Clone)]
pub struct SearchState {
    pub state: ControllerState,
    pub attempts: u32,
    pub consecutive_errors: u32,
    pub interval_ms: u64,
    base_interval_ms: u64,
}

impl SearchState {
    pub fn new(base_interval_ms: u64) -> Self {
        Self {
            state: ControllerState::Idle,
            attempts: 0,
            consecutive_errors: 0,
            interval_ms: base_interval_ms,
            base_interval_ms,
        }
    }

    pub fn start(&mut self) {
        if self.state == ControllerState::Idle {
            self.state = ControllerState::Running;
        }
    }

    /// Count a new attempt. Returns the terminal event when the attempt
    /// budget is already spent.
    pub fn begin_attempt(&mut self, config: &SearchConfig, duration_ms: u64) -> Option<ProgressEvent> {
        self.attempts += 1;
        if self.attempts > config.max_attempts {
            self.attempts = config.max_attempts;
            self.state = ControllerState::Failed;
            return Some(ProgressEvent::fatal(
                Error::Exhausted(config.max_attempts).to_string(),
                self.attempts,
                duration_ms,
            ));
        }
        None
    }

    /// Apply one attempt outcome. Pure apart from `self`.
    pub fn transition(
        &mut self,
        outcome: AttemptOutcome,
        config: &SearchConfig,
        duration_ms: u64,
    ) -> Step {
        let attempts = self.attempts;

        let step = match outcome {
            AttemptOutcome::Matched {
                display_name,
                discriminator,
            } => {
                self.state = ControllerState::Succeeded;
                return Step::Stop(ProgressEvent::Success {
                    display_name,
                    discriminator,
                    attempts,
                    duration_ms,
                });
            }
            AttemptOutcome::AuthMissing => {
                self.state = ControllerState::Failed;
                return Step::Stop(ProgressEvent::fatal(
                    Error::Unauthorized("Missing token".into()).to_string(),
                    attempts,
                    duration_ms,
                ));
            }
            AttemptOutcome::AuthRejected { reason } => {
                self.state = ControllerState::Failed;
                return Step::Stop(ProgressEvent::fatal(
                    Error::Unauthorized(reason).to_string(),
                    attempts,
                    duration_ms,
                ));
            }
            AttemptOutcome::FetchFailed { reason } | AttemptOutcome::UpdateFailed { reason } => {
                self.consecutive_errors += 1;
                if self.consecutive_errors >= config.max_consecutive_errors {
                    self.state = ControllerState::Failed;
                    return Step::Stop(ProgressEvent::fatal(
                        Error::ConsecutiveFailures {
                            count: self.consecutive_errors,
                            last: reason,
                        }
                        .to_string(),
                        attempts,
                        duration_ms,
                    ));
                }
                self.interval_ms = config.next_backoff_ms(self.interval_ms);
                Step::Continue {
                    event: ProgressEvent::Error {
                        message: reason,
                        attempts,
                        duration_ms,
                        fatal: false,
                        retry_in_ms: Some(self.interval_ms),
                    },
                    delay: Duration::from_millis(self.interval_ms),
                }
            }
            // The new suffix is unknown until the next read.
            AttemptOutcome::UpdatedNoMatch { discriminator } => {
                debug!(attempt = attempts, rejected = %discriminator, "Waiting for next tick");
                self.consecutive_errors = 0;
                self.interval_ms = self.base_interval_ms;
                Step::Continue {
                    event: ProgressEvent::Status {
                        attempt: attempts,
                        phase: Phase::Waiting,
                        current_discriminator: None,
                    },
                    delay: Duration::from_millis(self.interval_ms),
                }
            }
        };

        if attempts >= config.max_attempts {
            self.state = ControllerState::Failed;
            return Step::Stop(ProgressEvent::fatal(
                Error::Exhausted(config.max_attempts).to_string(),
                attempts,
                duration_ms,
            ));
        }

        step
    }

    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            self.state = ControllerState::Aborted;
        }
    }
}

/// Drives ticks for one search until a terminal state.
pub struct SearchController {
    executor: AttemptExecutor,
    config: SearchConfig,
    cancel: CancellationToken,
}

impl SearchController {
    pub fn new(executor: AttemptExecutor, config: SearchConfig, cancel: CancellationToken) -> Self {
        Self {
            executor,
            config,
            cancel,
        }
    }

    /// Run ticks until success, failure, or cancellation, then send exactly
    /// one terminal event.
    ///
    /// `started_at` is when the search began, so durations include
    /// authentication.
    pub async fn run(
        self,
        token: String,
        targets: TargetSet,
        base_interval_ms: u64,
        started_at: Instant,
        progress: ProgressSender,
    ) -> ControllerState {
        let elapsed_ms = || started_at.elapsed().as_millis() as u64;
        let mut state = SearchState::new(base_interval_ms);
        state.start();

        info!(
            target_count = targets.len(),
            interval_ms = base_interval_ms,
            max_attempts = self.config.max_attempts,
            "Search started"
        );

        loop {
            if let Some(event) = state.begin_attempt(&self.config, elapsed_ms()) {
                return finish(state, event, progress);
            }

            let outcome = self
                .executor
                .attempt(&token, &targets, state.attempts, &progress)
                .await;

            // An in-flight call completes; its result is discarded.
            if self.cancel.is_cancelled() {
                return self.abort(state, progress, elapsed_ms());
            }

            debug!(
                attempt = state.attempts,
                outcome = outcome.label(),
                "Attempt finished"
            );

            match state.transition(outcome, &self.config, elapsed_ms()) {
                Step::Stop(event) => return finish(state, event, progress),
                Step::Continue { event, delay } => {
                    if let ProgressEvent::Error { ref message, .. } = event {
                        warn!(
                            attempt = state.attempts,
                            consecutive_errors = state.consecutive_errors,
                            interval_ms = state.interval_ms,
                            error = %message,
                            "Attempt failed, backing off"
                        );
                    } else {
                        debug!(
                            attempt = state.attempts,
                            interval_ms = state.interval_ms,
                            "No match, waiting"
                        );
                    }

                    progress.emit(event);

                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return self.abort(state, progress, elapsed_ms());
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn abort(&self, mut state: SearchState, progress: ProgressSender, duration_ms: u64) -> ControllerState {
        state.abort();
        info!(attempt = state.attempts, duration_ms, "Search cancelled");
        // Nobody is listening when the stream was dropped; the send is a no-op.
        progress.finish(ProgressEvent::fatal(
            Error::Cancelled.to_string(),
            state.attempts,
            duration_ms,
        ));
        state.state
    }
}

fn finish(state: SearchState, event: ProgressEvent, progress: ProgressSender) -> ControllerState {
    match event {
        ProgressEvent::Success {
            ref discriminator,
            attempts,
            duration_ms,
            ..
        } => info!(
            discriminator = %discriminator,
            attempts,
            duration_ms,
            state = ?state.state,
            "Search succeeded"
        ),
        ProgressEvent::Error {
            ref message,
            attempts,
            duration_ms,
            ..
        } => error!(
            error = %message,
            attempts,
            duration_ms,
            fatal = true,
            state = ?state.state,
            "Search failed"
        ),
        ProgressEvent::Status { .. } => {}
    }
    progress.finish(event);
    state.state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SearchConfig {
        SearchConfig::default()
    }

    fn running(config: &SearchConfig) -> SearchState {
        let mut state = SearchState::new(config.base_interval_ms);
        state.start();
        assert!(state.begin_attempt(config, 0).is_none());
        state
    }

    fn fetch_failed() -> AttemptOutcome {
        AttemptOutcome::FetchFailed {
            reason: "Gateway error: down".into(),
        }
    }

    fn no_match() -> AttemptOutcome {
        AttemptOutcome::UpdatedNoMatch {
            discriminator: "5555".into(),
        }
    }

    #[test]
    fn test_start_moves_idle_to_running() {
        let mut state = SearchState::new(700);
        assert_eq!(state.state, ControllerState::Idle);
        state.start();
        assert_eq!(state.state, ControllerState::Running);
    }

    #[test]
    fn test_match_succeeds() {
        let config = config();
        let mut state = running(&config);

        let step = state.transition(
            AttemptOutcome::Matched {
                display_name: "Foo#1234".into(),
                discriminator: "1234".into(),
            },
            &config,
            5,
        );

        assert_eq!(state.state, ControllerState::Succeeded);
        match step {
            Step::Stop(ProgressEvent::Success { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn test_transient_failure_backs_off() {
        let config = config();
        let mut state = running(&config);

        match state.transition(fetch_failed(), &config, 0) {
            Step::Continue {
                event:
                    ProgressEvent::Error {
                        fatal, retry_in_ms, ..
                    },
                delay,
            } => {
                assert!(!fatal);
                assert_eq!(retry_in_ms, Some(1050));
                assert_eq!(delay, Duration::from_millis(1050));
            }
            other => panic!("unexpected step: {:?}", other),
        }
        assert_eq!(state.consecutive_errors, 1);
        assert_eq!(state.state, ControllerState::Running);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = config().with_max_consecutive_errors(100);
        let mut state = running(&config);

        for _ in 0..20 {
            state.transition(fetch_failed(), &config, 0);
            state.begin_attempt(&config, 0);
        }
        assert_eq!(state.interval_ms, config.max_interval_ms);
    }

    #[test]
    fn test_no_match_resets_interval_and_errors() {
        let config = config();
        let mut state = running(&config);

        state.transition(fetch_failed(), &config, 0);
        state.begin_attempt(&config, 0);
        state.transition(
            AttemptOutcome::UpdateFailed {
                reason: "x".into(),
            },
            &config,
            0,
        );
        assert_eq!(state.consecutive_errors, 2);
        assert!(state.interval_ms > config.base_interval_ms);

        state.begin_attempt(&config, 0);
        let step = state.transition(no_match(), &config, 0);

        assert_eq!(state.consecutive_errors, 0);
        assert_eq!(state.interval_ms, config.base_interval_ms);
        assert_eq!(
            step,
            Step::Continue {
                event: ProgressEvent::Status {
                    attempt: 3,
                    phase: Phase::Waiting,
                    current_discriminator: None,
                },
                delay: Duration::from_millis(700),
            }
        );
    }

    #[test]
    fn test_consecutive_errors_are_fatal() {
        let config = config();
        let mut state = running(&config);

        assert!(matches!(
            state.transition(fetch_failed(), &config, 0),
            Step::Continue { .. }
        ));
        state.begin_attempt(&config, 0);
        assert!(matches!(
            state.transition(fetch_failed(), &config, 0),
            Step::Continue { .. }
        ));
        state.begin_attempt(&config, 0);

        match state.transition(fetch_failed(), &config, 0) {
            Step::Stop(ProgressEvent::Error {
                message, fatal, ..
            }) => {
                assert!(fatal);
                assert!(message.contains("Too many consecutive errors (3)"));
                assert!(message.contains("down"));
            }
            other => panic!("unexpected step: {:?}", other),
        }
        assert_eq!(state.state, ControllerState::Failed);
    }

    #[test]
    fn test_auth_failures_are_immediately_fatal() {
        let config = config();

        let mut state = running(&config);
        assert!(matches!(
            state.transition(AttemptOutcome::AuthMissing, &config, 0),
            Step::Stop(ProgressEvent::Error { fatal: true, .. })
        ));
        assert_eq!(state.state, ControllerState::Failed);

        let mut state = running(&config);
        match state.transition(
            AttemptOutcome::AuthRejected {
                reason: "Unauthorized".into(),
            },
            &config,
            0,
        ) {
            Step::Stop(ProgressEvent::Error { message, .. }) => {
                assert_eq!(message, "Unauthorized: Unauthorized")
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn test_last_attempt_exhausts() {
        let config = config().with_max_attempts(2);
        let mut state = running(&config);

        assert!(matches!(
            state.transition(no_match(), &config, 0),
            Step::Continue { .. }
        ));
        assert!(state.begin_attempt(&config, 0).is_none());

        match state.transition(no_match(), &config, 0) {
            Step::Stop(ProgressEvent::Error {
                message, attempts, ..
            }) => {
                assert_eq!(message, "Maximum attempts reached (2)");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected step: {:?}", other),
        }
        assert_eq!(state.state, ControllerState::Failed);
    }

    #[test]
    fn test_begin_attempt_guard() {
        let config = config().with_max_attempts(1);
        let mut state = running(&config);
        let event = state.begin_attempt(&config, 0).expect("budget spent");
        assert!(event.is_terminal());
        assert_eq!(state.attempts, 1);
    }

    #[test]
    fn test_abort_does_not_override_terminal_state() {
        let config = config();
        let mut state = running(&config);
        state.transition(
            AttemptOutcome::Matched {
                display_name: "a#1234".into(),
                discriminator: "1234".into(),
            },
            &config,
            0,
        );
        state.abort();
        assert_eq!(state.state, ControllerState::Succeeded);

        let mut state = running(&config);
        state.abort();
        assert_eq!(state.state, ControllerState::Aborted);
    }
}
