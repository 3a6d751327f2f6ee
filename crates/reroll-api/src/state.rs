//! Shared application state.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use tracing::warn;

use reroll_search::SearchOrchestrator;

use crate::config::ServerConfig;

/// Global (unkeyed) rate limiter applied to search starts.
pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: SearchOrchestrator,
    /// `None` when rate limiting is disabled.
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(orchestrator: SearchOrchestrator, config: &ServerConfig) -> Self {
        Self {
            orchestrator,
            rate_limiter: build_rate_limiter(config),
        }
    }

    /// Whether a new search may start now. Consumes one cell when allowed.
    pub fn allow_search(&self) -> bool {
        match &self.rate_limiter {
            Some(limiter) => limiter.check().is_ok(),
            None => true,
        }
    }
}

pub fn build_rate_limiter(config: &ServerConfig) -> Option<Arc<GlobalRateLimiter>> {
    if !config.rate_limit_enabled {
        return None;
    }

    let burst = u32::try_from(config.rate_limit_requests)
        .ok()
        .and_then(NonZeroU32::new);
    let quota = Quota::with_period(config.rate_limit_period());

    match (quota, burst) {
        (Some(quota), Some(burst)) => Some(Arc::new(RateLimiter::direct(quota.allow_burst(burst)))),
        _ => {
            warn!(
                requests = config.rate_limit_requests,
                period_secs = config.rate_limit_period_secs,
                "Rate limit values must be non-zero, rate limiting disabled"
            );
            None
        }
    }
}
