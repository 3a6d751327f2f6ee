//! Scripted in-process gateway for deterministic testing.
//!
//! The mock behaves like the real service: reads return the current display
//! name, and every successful change assigns the next suffix from a queue.
//! Faults can be injected per operation.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reroll_core::AccountGateway;
//! use reroll_gateway::mock::MockGateway;
//!
//! #[tokio::test]
//! async fn test_with_mock_gateway() {
//!     let gateway = MockGateway::new("Foo", "5555").with_rerolls(["1234"]);
//!
//!     let account = gateway.read_account("token").await.unwrap();
//!     assert_eq!(account.display_name, "Foo#5555");
//!
//!     gateway.change_display_name("token", "Foo").await.unwrap();
//!     let account = gateway.read_account("token").await.unwrap();
//!     assert_eq!(account.display_name, "Foo#1234");
//! }
//! ```

use async_trait::async_trait;
use serde_json::Map;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use reroll_core::{Account, AccountGateway, Error, Result};

/// Token handed out by [`MockGateway::authenticate`] unless overridden.
pub const MOCK_TOKEN: &str = "mock-token";

/// A fault injected into one gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Transient gateway error with the given message.
    Gateway(String),
    /// Token or credentials rejected.
    Unauthorized,
    /// The call panics.
    Panic,
}

impl Fault {
    pub fn gateway(message: impl Into<String>) -> Self {
        Fault::Gateway(message.into())
    }

    fn into_result<T>(self, op: &str) -> Result<T> {
        match self {
            Fault::Gateway(message) => Err(Error::Gateway(message)),
            Fault::Unauthorized => Err(Error::Unauthorized("Unauthorized".to_string())),
            Fault::Panic => panic!("mock gateway: injected panic in {}", op),
        }
    }
}

/// Which operation a recorded call hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOperation {
    Authenticate,
    ReadAccount,
    ChangeDisplayName,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: MockOperation,
    /// Email for `Authenticate`, token otherwise.
    pub input: String,
    pub timestamp: Instant,
}

#[derive(Debug)]
struct MockState {
    nickname: String,
    discriminator: String,
    rerolls: VecDeque<String>,
    token: String,
    credentials: Option<(String, String)>,
    auth_faults: VecDeque<Fault>,
    read_faults: VecDeque<Fault>,
    change_faults: VecDeque<Fault>,
    persistent_read_fault: Option<Fault>,
    persistent_change_fault: Option<Fault>,
    calls: Vec<MockCall>,
}

/// Mock [`AccountGateway`] for tests.
///
/// Clones share state, so a test can keep a handle while the search owns
/// another behind `Arc<dyn AccountGateway>`.
#[derive(Debug, Clone)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
    latency: Duration,
}

impl MockGateway {
    /// Start with display name `<nickname>#<discriminator>`.
    pub fn new(nickname: impl Into<String>, discriminator: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                nickname: nickname.into(),
                discriminator: discriminator.into(),
                rerolls: VecDeque::new(),
                token: MOCK_TOKEN.to_string(),
                credentials: None,
                auth_faults: VecDeque::new(),
                read_faults: VecDeque::new(),
                change_faults: VecDeque::new(),
                persistent_read_fault: None,
                persistent_change_fault: None,
                calls: Vec::new(),
            })),
            latency: Duration::ZERO,
        }
    }

    /// Suffixes assigned by successive successful changes. Once exhausted,
    /// changes keep the current suffix.
    pub fn with_rerolls<I, S>(self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock()
            .rerolls
            .extend(suffixes.into_iter().map(Into::into));
        self
    }

    /// Only accept this email/password pair; anything else is unauthorized.
    pub fn with_credentials(self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.lock().credentials = Some((email.into(), password.into()));
        self
    }

    /// Token returned by `authenticate`.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.lock().token = token.into();
        self
    }

    /// Delay applied to every call, on the tokio clock.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a fault for the next unfaulted `authenticate` call.
    pub fn fail_next_auth(&self, fault: Fault) {
        self.lock().auth_faults.push_back(fault);
    }

    /// Queue `count` faults for upcoming reads.
    pub fn fail_next_reads(&self, count: usize, fault: Fault) {
        let mut state = self.lock();
        for _ in 0..count {
            state.read_faults.push_back(fault.clone());
        }
    }

    /// Queue `count` faults for upcoming changes.
    pub fn fail_next_changes(&self, count: usize, fault: Fault) {
        let mut state = self.lock();
        for _ in 0..count {
            state.change_faults.push_back(fault.clone());
        }
    }

    /// Fail every read until cleared with `None`.
    pub fn fail_all_reads(&self, fault: Option<Fault>) {
        self.lock().persistent_read_fault = fault;
    }

    /// Fail every change until cleared with `None`.
    pub fn fail_all_changes(&self, fault: Option<Fault>) {
        self.lock().persistent_change_fault = fault;
    }

    /// Current display name as the service would report it.
    pub fn display_name(&self) -> String {
        let state = self.lock();
        format!("{}#{}", state.nickname, state.discriminator)
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn call_count(&self, operation: MockOperation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub fn read_count(&self) -> usize {
        self.call_count(MockOperation::ReadAccount)
    }

    pub fn change_count(&self) -> usize {
        self.call_count(MockOperation::ChangeDisplayName)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // An injected panic never holds the lock, but recover anyway.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn log_call(&self, operation: MockOperation, input: &str) {
        self.lock().calls.push(MockCall {
            operation,
            input: input.to_string(),
            timestamp: Instant::now(),
        });
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new("Player", "0001")
    }
}

#[async_trait]
impl AccountGateway for MockGateway {
    async fn authenticate(&self, email: &str, password: &str) -> Result<String> {
        self.log_call(MockOperation::Authenticate, email);
        self.simulate_latency().await;

        let (fault, outcome) = {
            let mut state = self.lock();
            let fault = state.auth_faults.pop_front();
            let accepted = match state.credentials {
                Some((ref e, ref p)) => e == email && p == password,
                None => true,
            };
            (fault, accepted.then(|| state.token.clone()))
        };

        if let Some(fault) = fault {
            return fault.into_result("authenticate");
        }

        outcome.ok_or_else(|| Error::Unauthorized("Invalid credentials".to_string()))
    }

    async fn read_account(&self, token: &str) -> Result<Account> {
        self.log_call(MockOperation::ReadAccount, token);
        self.simulate_latency().await;

        let (fault, display_name) = {
            let mut state = self.lock();
            let fault = state
                .read_faults
                .pop_front()
                .or_else(|| state.persistent_read_fault.clone());
            (
                fault,
                format!("{}#{}", state.nickname, state.discriminator),
            )
        };

        if let Some(fault) = fault {
            return fault.into_result("read_account");
        }

        Ok(Account {
            display_name,
            extra: Map::new(),
        })
    }

    async fn change_display_name(&self, token: &str, nickname: &str) -> Result<String> {
        self.log_call(MockOperation::ChangeDisplayName, token);
        self.simulate_latency().await;

        let fault = {
            let mut state = self.lock();
            let fault = state
                .change_faults
                .pop_front()
                .or_else(|| state.persistent_change_fault.clone());
            if fault.is_none() {
                state.nickname = nickname.to_string();
                if let Some(next) = state.rerolls.pop_front() {
                    state.discriminator = next;
                }
            }
            fault
        };

        match fault {
            Some(fault) => fault.into_result("change_display_name"),
            None => Ok(nickname.to_string()),
        }
    }
}
