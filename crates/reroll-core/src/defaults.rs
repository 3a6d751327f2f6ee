//! Centralized default constants for reroll.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Each value can be overridden through the matching config struct.

// =============================================================================
// SEARCH LOOP
// =============================================================================

/// Delay between ticks after a successful change, in milliseconds.
pub const SEARCH_BASE_INTERVAL_MS: u64 = 700;

/// Smallest base interval a search may run with, in milliseconds.
pub const SEARCH_MIN_INTERVAL_MS: u64 = 250;

/// Multiplier applied to the current interval after each failed tick.
pub const SEARCH_BACKOFF_FACTOR: f64 = 1.5;

/// Upper bound for the backed-off interval, in milliseconds.
pub const SEARCH_MAX_INTERVAL_MS: u64 = 10_000;

/// Failed ticks in a row before the search gives up.
pub const SEARCH_MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Hard ceiling on attempts per search.
pub const SEARCH_MAX_ATTEMPTS: u32 = 3000;

/// Per gateway call timeout inside one attempt, in milliseconds.
pub const SEARCH_CALL_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// DISCRIMINATORS
// =============================================================================

/// Number of digits in a discriminator.
pub const DISCRIMINATOR_LEN: usize = 4;

/// Suffixes matched by the repeated-digit wildcard.
pub const REPEATED_DIGIT_DISCRIMINATORS: [&str; 10] = [
    "0000", "1111", "2222", "3333", "4444", "5555", "6666", "7777", "8888", "9999",
];

/// Delimiter between nickname and discriminator in a display name.
pub const DISPLAY_NAME_DELIMITER: char = '#';

// =============================================================================
// GATEWAY
// =============================================================================

/// Default Apex Connect base URL.
pub const GATEWAY_BASE_URL: &str = "https://apex-connect.avalanchestudios.com";

/// Default HTTP client timeout for gateway requests, in seconds.
pub const GATEWAY_TIMEOUT_SECS: u64 = 30;

/// Error string the gateway uses for rejected credentials or tokens.
pub const GATEWAY_UNAUTHORIZED: &str = "Unauthorized";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default rate limit: max search starts per period.
pub const RATE_LIMIT_REQUESTS: u64 = 10;

/// Default rate limit: period in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// Maximum accepted request body, in bytes.
pub const REQUEST_BODY_LIMIT: usize = 64 * 1024;
