//! Search loop configuration.

use std::time::Duration;

use reroll_core::defaults;
use reroll_core::{Error, Result};

/// Tuning knobs for one discriminator search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Delay between ticks after a successful change, in milliseconds.
    pub base_interval_ms: u64,
    /// Floor for the base interval, including per-request overrides.
    pub min_interval_ms: u64,
    /// Multiplier applied to the interval after a failed tick.
    pub backoff_factor: f64,
    /// Cap for the backed-off interval, in milliseconds.
    pub max_interval_ms: u64,
    /// Failed ticks in a row before the search fails.
    pub max_consecutive_errors: u32,
    /// Attempts before the search fails with exhaustion.
    pub max_attempts: u32,
    /// Bound on each individual gateway call, in milliseconds.
    pub call_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: defaults::SEARCH_BASE_INTERVAL_MS,
            min_interval_ms: defaults::SEARCH_MIN_INTERVAL_MS,
            backoff_factor: defaults::SEARCH_BACKOFF_FACTOR,
            max_interval_ms: defaults::SEARCH_MAX_INTERVAL_MS,
            max_consecutive_errors: defaults::SEARCH_MAX_CONSECUTIVE_ERRORS,
            max_attempts: defaults::SEARCH_MAX_ATTEMPTS,
            call_timeout_ms: defaults::SEARCH_CALL_TIMEOUT_MS,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl SearchConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SEARCH_BASE_INTERVAL_MS` | `700` | Delay after a successful change |
    /// | `SEARCH_MIN_INTERVAL_MS` | `250` | Lowest allowed base interval |
    /// | `SEARCH_BACKOFF_FACTOR` | `1.5` | Interval multiplier on failure |
    /// | `SEARCH_MAX_INTERVAL_MS` | `10000` | Backoff cap |
    /// | `SEARCH_MAX_CONSECUTIVE_ERRORS` | `3` | Failed ticks in a row before giving up |
    /// | `SEARCH_MAX_ATTEMPTS` | `3000` | Attempts per search |
    /// | `SEARCH_CALL_TIMEOUT_MS` | `30000` | Per gateway call timeout |
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            base_interval_ms: env_or("SEARCH_BASE_INTERVAL_MS", d.base_interval_ms),
            min_interval_ms: env_or("SEARCH_MIN_INTERVAL_MS", d.min_interval_ms),
            backoff_factor: env_or("SEARCH_BACKOFF_FACTOR", d.backoff_factor),
            max_interval_ms: env_or("SEARCH_MAX_INTERVAL_MS", d.max_interval_ms),
            max_consecutive_errors: env_or(
                "SEARCH_MAX_CONSECUTIVE_ERRORS",
                d.max_consecutive_errors,
            ),
            max_attempts: env_or("SEARCH_MAX_ATTEMPTS", d.max_attempts),
            call_timeout_ms: env_or("SEARCH_CALL_TIMEOUT_MS", d.call_timeout_ms),
        }
    }

    pub fn with_base_interval_ms(mut self, ms: u64) -> Self {
        self.base_interval_ms = ms;
        self
    }

    pub fn with_min_interval_ms(mut self, ms: u64) -> Self {
        self.min_interval_ms = ms;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval_ms(mut self, ms: u64) -> Self {
        self.max_interval_ms = ms;
        self
    }

    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_call_timeout_ms(mut self, ms: u64) -> Self {
        self.call_timeout_ms = ms;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Interval after one more failed tick, starting from `current_ms`.
    pub fn next_backoff_ms(&self, current_ms: u64) -> u64 {
        let next = (current_ms as f64 * self.backoff_factor).round() as u64;
        next.min(self.max_interval_ms)
    }

    /// Base interval for one search: the configured one, or a per-request
    /// override that must lie within `min_interval_ms..=max_interval_ms`.
    pub fn effective_interval_ms(&self, requested: Option<u64>) -> Result<u64> {
        match requested {
            None => Ok(self.base_interval_ms),
            Some(ms) if (self.min_interval_ms..=self.max_interval_ms).contains(&ms) => Ok(ms),
            Some(ms) => Err(Error::Validation(format!(
                "Interval must be between {} and {} milliseconds, got {}",
                self.min_interval_ms, self.max_interval_ms, ms
            ))),
        }
    }

    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.min_interval_ms == 0 {
            return Err(Error::Config("min interval must be positive".into()));
        }
        if self.base_interval_ms < self.min_interval_ms {
            return Err(Error::Config(format!(
                "base interval ({}ms) is below min interval ({}ms)",
                self.base_interval_ms, self.min_interval_ms
            )));
        }
        if !(self.backoff_factor >= 1.0 && self.backoff_factor.is_finite()) {
            return Err(Error::Config(format!(
                "backoff factor must be >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.max_interval_ms < self.base_interval_ms {
            return Err(Error::Config(format!(
                "max interval ({}ms) is below base interval ({}ms)",
                self.max_interval_ms, self.base_interval_ms
            )));
        }
        if self.max_consecutive_errors == 0 {
            return Err(Error::Config(
                "max consecutive errors must be at least 1".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max attempts must be at least 1".into()));
        }
        if self.call_timeout_ms == 0 {
            return Err(Error::Config("call timeout must be positive".into()));
        }
        Ok(())
    }
}
