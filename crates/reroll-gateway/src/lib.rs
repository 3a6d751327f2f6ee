//! # reroll-gateway
//!
//! Client for the Apex Connect account service, implementing
//! [`reroll_core::AccountGateway`].
//!
//! - [`ApexGateway`]: HTTP client (login, account read, nickname change)
//! - `mock::MockGateway`: scripted gateway for tests (feature `mock`)
//!
//! Configuration via environment:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | APEX_BASE_URL | https://apex-connect.avalanchestudios.com | Service base URL |
//! | APEX_TIMEOUT_SECS | 30 | HTTP client timeout |
//! | APEX_USER_AGENT | (reqwest default) | User-Agent header |

pub mod apex;
pub mod error;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use apex::{ApexGateway, GatewayConfig};
pub use error::ApexErrorCode;
