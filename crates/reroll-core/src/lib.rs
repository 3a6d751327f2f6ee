//! # reroll-core
//!
//! Core types, traits, and abstractions for reroll, a tool that keeps
//! changing a game-account display name until the randomly assigned
//! discriminator lands in a wanted set.
//!
//! This crate holds the data model shared by the gateway client, the search
//! loop, and the HTTP API, plus the [`AccountGateway`] trait the search loop
//! is written against.
//!
//! ## Logging conventions
//!
//! Every crate logs through `tracing` with the same structured field names:
//! `search_id`, `request_id`, `attempt`, `discriminator`, `target_count`,
//! `interval_ms`, `consecutive_errors`, `outcome`, `state`, `duration_ms`,
//! `status`, `error`, `fatal`.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Search terminated by a fatal error |
//! | WARN  | Recoverable issue, backoff applied |
//! | INFO  | Lifecycle events (startup, search start/finish) |
//! | DEBUG | Decision points, intervals, config choices |
//! | TRACE | Per-call gateway payloads |

pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
