//! # reroll-search
//!
//! The discriminator search loop.
//!
//! This crate provides:
//! - [`AttemptExecutor`]: one read-check-maybe-write cycle
//! - [`SearchController`]: the backoff state machine driving ticks
//! - [`ProgressStream`]: ordered progress events, ending in exactly one
//!   terminal event; dropping it cancels the search
//! - [`SearchOrchestrator`]: validation, credential resolution, and spawning
//! - NDJSON framing for progress events
//! - [`RemoteSearch`]: follows a search on a reroll-api server, re-issuing it
//!   when the connection drops
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use reroll_core::SearchRequest;
//! use reroll_gateway::ApexGateway;
//! use reroll_search::{SearchConfig, SearchOrchestrator};
//!
//! let gateway = Arc::new(ApexGateway::from_env()?);
//! let orchestrator = SearchOrchestrator::new(gateway, SearchConfig::from_env())?;
//!
//! let request = SearchRequest::parse(None, None, Some("token"), "1234, 0420", false)?;
//! let mut stream = orchestrator.start_search(request)?;
//! while let Some(event) = stream.next().await {
//!     println!("{:?}", event);
//! }
//! ```

pub mod channel;
pub mod config;
pub mod controller;
pub mod executor;
pub mod ndjson;
pub mod orchestrator;
pub mod remote;

pub use channel::{progress_channel, ProgressSender, ProgressStream};
pub use config::SearchConfig;
pub use controller::{ControllerState, SearchController, SearchState, Step};
pub use executor::AttemptExecutor;
pub use ndjson::{encode_line, NdjsonDecoder};
pub use orchestrator::SearchOrchestrator;
pub use remote::{RemoteSearch, RemoteSearchRequest};
