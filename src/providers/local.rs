//! Local mailer for development and testing.
//!
//! Captures envelopes in memory for programmatic assertions, and lets tests
//! script the provider's quota and failures.
//!
//! ```rust,ignore
//! use hermes::providers::LocalMailer;
//! use hermes::testing::*;
//!
//! #[tokio::test]
//! async fn test_dispatches_welcome_email() {
//!     let mailer = LocalMailer::new();
//!
//!     // Code under test
//!     run_worker_once(&mailer).await;
//!
//!     // Assertions
//!     assert_email_sent(&mailer);
//!     assert_email_to(&mailer, "user@example.com");
//!     assert_email_subject_contains(&mailer, "Welcome");
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::governor::SendQuota;
use crate::mailer::{DeliveryResult, Mailer};

/// Quota reported until [`LocalMailer::set_quota`] is called.
pub const LOCAL_DEFAULT_QUOTA: SendQuota = SendQuota {
    max_send_rate: 1000.0,
    max_24_hour_send: 1_000_000.0,
    sent_last_24_hours: 0.0,
};

/// An envelope accepted by [`LocalMailer`].
#[derive(Debug, Clone)]
pub struct SentEnvelope {
    /// Provider message id handed back to the caller
    pub id: String,
    pub envelope: Envelope,
    pub sent_at: DateTime<Utc>,
    /// Monotonic send time, follows tokio's paused clock in tests
    pub sent_instant: Instant,
}

#[derive(Debug)]
struct LocalState {
    sent: RwLock<Vec<SentEnvelope>>,
    quota: RwLock<Result<SendQuota, String>>,
    fail_with: RwLock<Option<String>>,
    status: RwLock<u16>,
    deliver_calls: AtomicUsize,
}

/// Local mailer that stores envelopes in memory.
///
/// Clones share captured envelopes and scripted behavior.
#[derive(Debug, Clone)]
pub struct LocalMailer {
    state: Arc<LocalState>,
}

impl LocalMailer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(LocalState {
                sent: RwLock::new(Vec::new()),
                quota: RwLock::new(Ok(LOCAL_DEFAULT_QUOTA)),
                fail_with: RwLock::new(None),
                status: RwLock::new(200),
                deliver_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Create a mailer reporting `quota`.
    pub fn with_quota(quota: SendQuota) -> Self {
        let mailer = Self::new();
        mailer.set_quota(quota);
        mailer
    }

    // =========================================================================
    // Scripted behavior (for testing)
    // =========================================================================

    pub fn set_quota(&self, quota: SendQuota) {
        *self.state.quota.write() = Ok(quota);
    }

    /// Make `quota()` fail with `message`.
    pub fn set_quota_failure(&self, message: impl Into<String>) {
        *self.state.quota.write() = Err(message.into());
    }

    /// Make `deliver()` fail with `message`.
    ///
    /// ```rust,ignore
    /// let mailer = LocalMailer::new();
    /// mailer.set_failure("Connection refused");
    ///
    /// let result = mailer.deliver(&envelope).await;
    /// assert!(result.is_err());
    /// ```
    pub fn set_failure(&self, message: impl Into<String>) {
        *self.state.fail_with.write() = Some(message.into());
    }

    pub fn clear_failure(&self) {
        *self.state.fail_with.write() = None;
    }

    /// Status reported by `deliver()`. Envelopes answered with a non-2xx
    /// status are not captured.
    pub fn set_status(&self, status: u16) {
        *self.state.status.write() = status;
    }

    // =========================================================================
    // Envelope access (for testing assertions)
    // =========================================================================

    /// All captured envelopes, oldest first.
    pub fn envelopes(&self) -> Vec<SentEnvelope> {
        self.state.sent.read().clone()
    }

    /// Get the most recently sent envelope.
    pub fn last_envelope(&self) -> Option<SentEnvelope> {
        self.state.sent.read().last().cloned()
    }

    pub fn envelope_count(&self) -> usize {
        self.state.sent.read().len()
    }

    /// Calls to `deliver()`, including failed ones.
    pub fn deliver_calls(&self) -> usize {
        self.state.deliver_calls.load(Ordering::SeqCst)
    }

    pub fn has_envelopes(&self) -> bool {
        self.envelope_count() > 0
    }

    /// Clear captured envelopes and the call counter.
    pub fn clear(&self) {
        self.state.sent.write().clear();
        self.state.deliver_calls.store(0, Ordering::SeqCst);
    }

    /// Remove and return all captured envelopes.
    pub fn flush(&self) -> Vec<SentEnvelope> {
        std::mem::take(&mut *self.state.sent.write())
    }

    // =========================================================================
    // Query helpers (for testing)
    // =========================================================================

    /// Check if an envelope was sent to a specific address.
    pub fn sent_to(&self, address: &str) -> bool {
        self.state
            .sent
            .read()
            .iter()
            .any(|s| s.envelope.is_addressed_to(address))
    }

    pub fn sent_with_subject(&self, subject: &str) -> bool {
        self.state
            .sent
            .read()
            .iter()
            .any(|s| s.envelope.subject == subject)
    }

    /// Find envelopes matching a predicate.
    pub fn find<F>(&self, predicate: F) -> Vec<SentEnvelope>
    where
        F: Fn(&Envelope) -> bool,
    {
        self.state
            .sent
            .read()
            .iter()
            .filter(|s| predicate(&s.envelope))
            .cloned()
            .collect()
    }

    /// Gaps between consecutive sends.
    pub fn send_gaps(&self) -> Vec<std::time::Duration> {
        self.state
            .sent
            .read()
            .windows(2)
            .map(|pair| pair[1].sent_instant.duration_since(pair[0].sent_instant))
            .collect()
    }
}

impl Default for LocalMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for LocalMailer {
    async fn quota(&self) -> Result<SendQuota, DispatchError> {
        self.state
            .quota
            .read()
            .clone()
            .map_err(|message| DispatchError::provider("local", message))
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<DeliveryResult, DispatchError> {
        self.state.deliver_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.state.fail_with.read().clone() {
            return Err(DispatchError::provider("local", message));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let result = DeliveryResult::with_status(id.clone(), *self.state.status.read());
        if result.is_success() {
            self.state.sent.write().push(SentEnvelope {
                id,
                envelope: envelope.clone(),
                sent_at: Utc::now(),
                sent_instant: Instant::now(),
            });
        }
        Ok(result)
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}
