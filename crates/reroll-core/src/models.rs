//! Domain models: credentials, targets, display names, attempt outcomes and
//! progress events.

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::defaults::{DISPLAY_NAME_DELIMITER, REPEATED_DIGIT_DISCRIMINATORS};
use crate::error::{Error, Result};

// `\d` is Unicode-aware in `regex`; the gateway only issues ASCII digits.
static DISCRIMINATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}$").expect("discriminator pattern is valid"));

/// Check that a value is exactly four ASCII digits.
pub fn is_valid_discriminator(value: &str) -> bool {
    DISCRIMINATOR_RE.is_match(value)
}

// =============================================================================
// CREDENTIALS
// =============================================================================

/// How a search authenticates against the gateway.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Bearer token obtained earlier.
    Token(String),
    /// Email and password, exchanged for a token when the search starts.
    Password { email: String, password: String },
}

impl Credentials {
    /// Build credentials from optional request fields.
    ///
    /// A non-blank token wins over email/password. Otherwise both email and
    /// password must be non-blank.
    pub fn resolve(
        email: Option<&str>,
        password: Option<&str>,
        token: Option<&str>,
    ) -> Result<Self> {
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(Credentials::Token(token.to_string()));
        }

        let email = email.map(str::trim).unwrap_or_default();
        let password = password.unwrap_or_default();

        match (email.is_empty(), password.trim().is_empty()) {
            (true, true) => Err(Error::Validation(
                "Missing credentials: provide a token or an email and password".to_string(),
            )),
            (true, false) => Err(Error::Validation("Email field is invalid".to_string())),
            (false, true) => Err(Error::Validation("Password field is invalid".to_string())),
            (false, false) => Ok(Credentials::Password {
                email: email.to_string(),
                password: password.to_string(),
            }),
        }
    }

    /// The bearer token, if one was supplied directly.
    pub fn token(&self) -> Option<&str> {
        match self {
            Credentials::Token(token) => Some(token),
            Credentials::Password { .. } => None,
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
            Credentials::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

// =============================================================================
// TARGET DISCRIMINATORS
// =============================================================================

/// Normalized, deduplicated set of discriminators a search stops on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct TargetSet(BTreeSet<String>);

impl TargetSet {
    /// Parse a comma-separated list such as `"1234, 0420,1984"`.
    ///
    /// Entries are trimmed and blank entries skipped. Any other entry that is
    /// not exactly four digits rejects the whole list. With
    /// `match_any_repeated_digit` the ten repeated-digit suffixes are added.
    pub fn parse(list: &str, match_any_repeated_digit: bool) -> Result<Self> {
        Self::from_values(list.split(','), match_any_repeated_digit)
    }

    /// Build a target set from individual values.
    pub fn from_values<I, S>(values: I, match_any_repeated_digit: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();

        for value in values {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            if !is_valid_discriminator(value) {
                return Err(Error::Validation(format!(
                    "Invalid discriminator '{}': expected exactly 4 digits",
                    value
                )));
            }
            set.insert(value.to_string());
        }

        if match_any_repeated_digit {
            set.extend(REPEATED_DIGIT_DISCRIMINATORS.iter().map(|d| d.to_string()));
        }

        if set.is_empty() {
            return Err(Error::Validation(
                "Discriminators field is invalid".to_string(),
            ));
        }

        Ok(Self(set))
    }

    /// Whether the given suffix is one of the targets.
    pub fn contains(&self, discriminator: &str) -> bool {
        self.0.contains(discriminator)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// ACCOUNT & DISPLAY NAME
// =============================================================================

/// A display name split into nickname and discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName {
    pub nickname: String,
    /// Empty when the raw value had no `#` delimiter.
    pub discriminator: String,
}

impl DisplayName {
    /// Split `"<nick>#<suffix>"` on the first delimiter.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(DISPLAY_NAME_DELIMITER) {
            Some((nickname, discriminator)) => Self {
                nickname: nickname.to_string(),
                discriminator: discriminator.to_string(),
            },
            None => Self {
                nickname: raw.to_string(),
                discriminator: String::new(),
            },
        }
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.discriminator.is_empty() {
            write!(f, "{}", self.nickname)
        } else {
            write!(
                f,
                "{}{}{}",
                self.nickname, DISPLAY_NAME_DELIMITER, self.discriminator
            )
        }
    }
}

/// Account record returned by the gateway.
///
/// Only `display_name` is interpreted; every other field is carried through
/// untouched for callers that display it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub display_name: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Account {
    pub fn parsed_display_name(&self) -> DisplayName {
        DisplayName::parse(&self.display_name)
    }
}

// =============================================================================
// SEARCH REQUEST
// =============================================================================

/// Validated input to one discriminator search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub credentials: Credentials,
    pub targets: TargetSet,
    /// Overrides the configured base interval for this search only.
    pub base_interval_ms: Option<u64>,
}

impl SearchRequest {
    pub fn new(credentials: Credentials, targets: TargetSet) -> Self {
        Self {
            credentials,
            targets,
            base_interval_ms: None,
        }
    }

    /// Parse raw request fields, rejecting invalid input before any network call.
    pub fn parse(
        email: Option<&str>,
        password: Option<&str>,
        token: Option<&str>,
        discriminators: &str,
        match_any_repeated_digit: bool,
    ) -> Result<Self> {
        let targets = TargetSet::parse(discriminators, match_any_repeated_digit)?;
        let credentials = Credentials::resolve(email, password, token)?;
        Ok(Self::new(credentials, targets))
    }

    pub fn with_base_interval_ms(mut self, ms: u64) -> Self {
        self.base_interval_ms = Some(ms);
        self
    }
}

// =============================================================================
// ATTEMPT OUTCOME
// =============================================================================

/// Classified result of one read-check-maybe-write cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Current suffix is a target; nothing was written.
    Matched {
        display_name: String,
        discriminator: String,
    },
    /// A change was submitted; `discriminator` is the rejected suffix seen
    /// before the write. The new suffix is observed by the next read.
    UpdatedNoMatch { discriminator: String },
    /// Reading the account failed.
    FetchFailed { reason: String },
    /// Submitting the change failed.
    UpdateFailed { reason: String },
    /// No bearer token available.
    AuthMissing,
    /// The gateway rejected the token.
    AuthRejected { reason: String },
}

impl AttemptOutcome {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Matched { .. } => "matched",
            AttemptOutcome::UpdatedNoMatch { .. } => "updated_no_match",
            AttemptOutcome::FetchFailed { .. } => "fetch_failed",
            AttemptOutcome::UpdateFailed { .. } => "update_failed",
            AttemptOutcome::AuthMissing => "auth_missing",
            AttemptOutcome::AuthRejected { .. } => "auth_rejected",
        }
    }
}

// =============================================================================
// PROGRESS EVENTS
// =============================================================================

/// Where a tick currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Exchanging email/password for a token.
    Authenticating,
    /// Account read completed.
    Checking,
    /// Change request about to be submitted.
    Updating,
    /// Change submitted; sleeping until the next tick.
    Waiting,
}

/// One unit of the progress stream.
///
/// Serialized as a JSON object with a `type` tag and camelCase fields, e.g.
/// `{"type":"status","attempt":1,"phase":"checking","currentDiscriminator":"5555"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    Status {
        attempt: u32,
        phase: Phase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_discriminator: Option<String>,
    },
    Success {
        display_name: String,
        discriminator: String,
        attempts: u32,
        duration_ms: u64,
    },
    Error {
        message: String,
        attempts: u32,
        duration_ms: u64,
        fatal: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_in_ms: Option<u64>,
    },
}

impl ProgressEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        match self {
            ProgressEvent::Status { .. } => false,
            ProgressEvent::Success { .. } => true,
            ProgressEvent::Error { fatal, .. } => *fatal,
        }
    }

    /// Terminal fatal error, used by the controller and orchestrator.
    pub fn fatal(message: impl Into<String>, attempts: u32, duration_ms: u64) -> Self {
        ProgressEvent::Error {
            message: message.into(),
            attempts,
            duration_ms,
            fatal: true,
            retry_in_ms: None,
        }
    }
}
