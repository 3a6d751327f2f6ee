//! Core traits for reroll abstractions.
//!
//! The search loop only talks to the remote service through
//! [`AccountGateway`], so the HTTP client and the test double are
//! interchangeable.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Account;

/// The remote account service: authentication, account read, and
/// display-name mutation.
///
/// Implementations must be cheap to share across concurrent searches; they
/// hold no per-search state.
#[async_trait]
pub trait AccountGateway: Send + Sync {
    /// Exchange email and password for a bearer token.
    ///
    /// Rejected credentials surface as [`crate::Error::Unauthorized`].
    async fn authenticate(&self, email: &str, password: &str) -> Result<String>;

    /// Read the account behind a token.
    async fn read_account(&self, token: &str) -> Result<Account>;

    /// Request a display-name change keeping `nickname`; the gateway assigns
    /// a fresh random discriminator. Returns the nickname it acknowledged.
    async fn change_display_name(&self, token: &str, nickname: &str) -> Result<String>;
}
