//! Rate governor: keeps sends inside the provider's quota.
//!
//! The provider reports two limits:
//!
//! - a maximum send rate (messages per second), turned into a minimum
//!   interval between sends: `floor(1000 / rate)` milliseconds
//! - a rolling 24 hour allowance, turned into a remaining count:
//!   `max(0, floor(max_24_hour_send - sent_last_24_hours))`
//!
//! The quota is read once per batch or polling cycle via
//! [`RateGovernor::refresh`]. The remaining count lives in a [`SendBudget`]
//! and the pacing clock behind a mutex, so one `Arc<RateGovernor>` can be
//! shared by several workers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::DispatchError;
use crate::mailer::Mailer;
use crate::shutdown::Shutdown;

/// Sending limits as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendQuota {
    /// Messages per second
    pub max_send_rate: f64,
    /// Messages allowed per rolling 24 hours
    #[serde(rename = "max24HourSend")]
    pub max_24_hour_send: f64,
    /// Messages sent in the last 24 hours
    #[serde(rename = "sentLast24Hours")]
    pub sent_last_24_hours: f64,
}

impl SendQuota {
    pub fn new(max_send_rate: f64, max_24_hour_send: f64, sent_last_24_hours: f64) -> Self {
        Self {
            max_send_rate,
            max_24_hour_send,
            sent_last_24_hours,
        }
    }

    /// Minimum delay between two sends.
    ///
    /// ```
    /// use hermes::SendQuota;
    /// use std::time::Duration;
    ///
    /// let quota = SendQuota::new(14.0, 50_000.0, 0.0);
    /// assert_eq!(quota.min_interval().unwrap(), Duration::from_millis(71));
    /// assert!(SendQuota::new(0.0, 50_000.0, 0.0).min_interval().is_err());
    /// ```
    pub fn min_interval(&self) -> Result<Duration, DispatchError> {
        if !self.max_send_rate.is_finite() || self.max_send_rate <= 0.0 {
            return Err(DispatchError::QuotaUnavailable(format!(
                "invalid max send rate {}",
                self.max_send_rate
            )));
        }
        Ok(Duration::from_millis((1000.0 / self.max_send_rate).floor() as u64))
    }

    /// Sends left in the current 24 hour window, never negative.
    pub fn remaining(&self) -> Result<u64, DispatchError> {
        let left = (self.max_24_hour_send - self.sent_last_24_hours).floor();
        if !left.is_finite() {
            return Err(DispatchError::QuotaUnavailable(format!(
                "invalid 24 hour quota {} / {}",
                self.sent_last_24_hours, self.max_24_hour_send
            )));
        }
        // Saturating float-to-int cast clamps negatives to zero
        Ok(left as u64)
    }
}

/// Shared count of sends left in the daily allowance.
///
/// Reservations must be atomic: two workers sharing a budget with one send
/// left must not both get it.
pub trait SendBudget: Send + Sync {
    /// Replace the count with a fresh value from the provider.
    fn reset(&self, remaining: u64);

    /// Take one send from the allowance. Returns `false` when none are left.
    fn try_reserve(&self) -> bool;

    /// Give back a reservation whose send did not happen.
    fn refund(&self);

    fn remaining(&self) -> u64;
}

/// In-process [`SendBudget`] backed by an atomic counter.
#[derive(Debug, Default)]
pub struct AtomicSendBudget {
    remaining: AtomicU64,
}

impl AtomicSendBudget {
    pub fn new(remaining: u64) -> Self {
        Self {
            remaining: AtomicU64::new(remaining),
        }
    }
}

impl SendBudget for AtomicSendBudget {
    fn reset(&self, remaining: u64) {
        self.remaining.store(remaining, Ordering::SeqCst);
    }

    fn try_reserve(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn refund(&self) {
        self.remaining.fetch_add(1, Ordering::SeqCst);
    }

    fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::SeqCst)
    }
}

/// What a refresh derived from the provider quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub min_interval: Duration,
    pub remaining: u64,
}

#[derive(Debug, Default)]
struct Pacing {
    min_interval: Duration,
    /// Earliest instant the next send may start.
    next_free: Option<Instant>,
}

/// Paces sends and tracks the daily allowance.
pub struct RateGovernor {
    budget: Arc<dyn SendBudget>,
    pacing: Mutex<Pacing>,
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGovernor")
            .field("remaining", &self.budget.remaining())
            .field("pacing", &*self.pacing.lock())
            .finish()
    }
}

impl RateGovernor {
    /// A governor with an empty in-process budget. Call [`refresh`](Self::refresh)
    /// before sending.
    pub fn new() -> Self {
        Self::with_budget(Arc::new(AtomicSendBudget::default()))
    }

    /// A governor over a caller-supplied budget.
    pub fn with_budget(budget: Arc<dyn SendBudget>) -> Self {
        Self {
            budget,
            pacing: Mutex::new(Pacing::default()),
        }
    }

    /// Create a governor wrapped in an Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Adopt a quota reading. The pacing clock is kept, so a refresh never
    /// lets a send through early.
    pub fn apply(&self, quota: &SendQuota) -> Result<QuotaSnapshot, DispatchError> {
        let min_interval = quota.min_interval()?;
        let remaining = quota.remaining()?;

        self.budget.reset(remaining);
        self.pacing.lock().min_interval = min_interval;

        tracing::debug!(
            min_interval_ms = min_interval.as_millis() as u64,
            remaining,
            "Send quota refreshed"
        );
        Ok(QuotaSnapshot {
            min_interval,
            remaining,
        })
    }

    /// Read the quota from the provider and adopt it.
    ///
    /// Any failure is reported as [`DispatchError::QuotaUnavailable`].
    pub async fn refresh(&self, mailer: &dyn Mailer) -> Result<QuotaSnapshot, DispatchError> {
        let quota = mailer.quota().await.map_err(|e| match e {
            DispatchError::QuotaUnavailable(_) => e,
            other => DispatchError::QuotaUnavailable(other.to_string()),
        })?;
        self.apply(&quota)
    }

    pub fn remaining(&self) -> u64 {
        self.budget.remaining()
    }

    pub fn min_interval(&self) -> Duration {
        self.pacing.lock().min_interval
    }

    /// Take one send from the allowance.
    pub fn try_reserve(&self) -> Result<(), DispatchError> {
        if self.budget.try_reserve() {
            Ok(())
        } else {
            Err(DispatchError::QuotaExhausted)
        }
    }

    /// Return a reservation whose send failed or never happened.
    pub fn refund(&self) {
        self.budget.refund();
    }

    /// Wait for this caller's send slot.
    ///
    /// The slot is claimed under the lock before sleeping, so concurrent
    /// callers are spaced at least `min_interval` apart. A claimed slot is
    /// consumed even if the send then fails.
    pub async fn wait_for_slot(&self, shutdown: &Shutdown) -> Result<(), DispatchError> {
        let slot = {
            let mut pacing = self.pacing.lock();
            let now = Instant::now();
            let slot = pacing.next_free.map_or(now, |free| free.max(now));
            pacing.next_free = Some(slot + pacing.min_interval);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Pacing before send");
        }
        shutdown.sleep_until(slot).await
    }

    /// Restart the pacing clock from now, after a completed send.
    pub fn record_send(&self) {
        let mut pacing = self.pacing.lock();
        let after = Instant::now() + pacing.min_interval;
        pacing.next_free = Some(pacing.next_free.map_or(after, |free| free.max(after)));
    }
}
