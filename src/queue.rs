//! Durable at-least-once work queue.
//!
//! [`Queue`] follows the SQS contract: a received item stays leased (hidden
//! from other consumers) until its visibility timeout runs out, and is only
//! gone for good once it is deleted with the receipt handle from that lease.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::DispatchError;

/// Receives after which [`MemoryQueue`] moves an item to its dead-letter list.
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 3;

/// One delivered queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    /// Queue-assigned id; stable across redeliveries.
    pub message_id: String,
    /// Handle for the current lease, used to delete the item.
    pub receipt_handle: String,
    /// An id (tracked mode) or a whole serialized email (inline mode).
    pub body: String,
    /// How many times this item has been received, including this one.
    pub receive_count: u32,
}

impl QueueItem {
    /// Build an item for push-mode invocations and tests.
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        let message_id = message_id.into();
        Self {
            receipt_handle: message_id.clone(),
            message_id,
            body: body.into(),
            receive_count: 1,
        }
    }
}

/// Queue operations used by the pipeline.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Enqueue a body and return the queue-assigned message id.
    async fn send(&self, body: &str) -> Result<String, DispatchError>;

    /// Receive up to `max_items`, waiting at most `wait` for the first one.
    /// Returned items are hidden from other receivers for `visibility_timeout`.
    async fn receive(
        &self,
        max_items: usize,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueItem>, DispatchError>;

    /// Acknowledge an item for good.
    async fn delete(&self, receipt_handle: &str) -> Result<(), DispatchError>;
}

#[async_trait]
impl<Q: Queue + ?Sized> Queue for Arc<Q> {
    async fn send(&self, body: &str) -> Result<String, DispatchError> {
        (**self).send(body).await
    }

    async fn receive(
        &self,
        max_items: usize,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueItem>, DispatchError> {
        (**self).receive(max_items, wait, visibility_timeout).await
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), DispatchError> {
        (**self).delete(receipt_handle).await
    }
}

#[derive(Debug)]
struct Entry {
    message_id: String,
    body: String,
    receive_count: u32,
    lease: Option<Lease>,
}

#[derive(Debug)]
struct Lease {
    receipt_handle: String,
    until: Instant,
}

impl Entry {
    fn is_visible(&self, now: Instant) -> bool {
        self.lease.as_ref().map_or(true, |lease| lease.until <= now)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<Entry>,
    dead_letters: Vec<QueueItem>,
}

/// In-memory [`Queue`] with leases, receive counts and a dead-letter list.
#[derive(Debug)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    arrivals: Notify,
    max_receive_count: u32,
    fail_with: Mutex<Option<String>>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_max_receive_count(DEFAULT_MAX_RECEIVE_COUNT)
    }

    pub fn with_max_receive_count(max_receive_count: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            arrivals: Notify::new(),
            max_receive_count: max_receive_count.max(1),
            fail_with: Mutex::new(None),
        }
    }

    /// Create a queue wrapped in an Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every operation fail with `message`.
    pub fn set_failure(&self, message: impl Into<String>) {
        *self.fail_with.lock() = Some(message.into());
    }

    pub fn clear_failure(&self) {
        *self.fail_with.lock() = None;
    }

    /// Items not yet deleted or dead-lettered, leased or not.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items currently available to a receiver.
    pub fn visible_len(&self) -> usize {
        let now = Instant::now();
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| e.is_visible(now))
            .count()
    }

    /// Items that exceeded the receive limit.
    pub fn dead_letters(&self) -> Vec<QueueItem> {
        self.state.lock().dead_letters.clone()
    }

    /// Bodies of all live items, oldest first.
    pub fn bodies(&self) -> Vec<String> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|e| e.body.clone())
            .collect()
    }

    fn check(&self) -> Result<(), DispatchError> {
        match self.fail_with.lock().as_ref() {
            Some(message) => Err(DispatchError::Queue(message.clone())),
            None => Ok(()),
        }
    }

    /// Lease up to `max_items` visible entries. Returns the items and, when
    /// nothing was available, the instant the next lease expires.
    fn take_visible(
        &self,
        max_items: usize,
        visibility_timeout: Duration,
    ) -> (Vec<QueueItem>, Option<Instant>) {
        let now = Instant::now();
        let mut state = self.state.lock();
        let QueueState {
            entries,
            dead_letters,
        } = &mut *state;

        let mut taken = Vec::new();
        let mut idx = 0;
        while idx < entries.len() && taken.len() < max_items {
            if !entries[idx].is_visible(now) {
                idx += 1;
                continue;
            }

            if entries[idx].receive_count >= self.max_receive_count {
                if let Some(entry) = entries.remove(idx) {
                    tracing::warn!(
                        message_id = %entry.message_id,
                        receive_count = entry.receive_count,
                        "Moving queue item to dead letters"
                    );
                    dead_letters.push(QueueItem {
                        receipt_handle: entry.message_id.clone(),
                        message_id: entry.message_id,
                        body: entry.body,
                        receive_count: entry.receive_count,
                    });
                }
                continue;
            }

            let entry = &mut entries[idx];
            entry.receive_count += 1;
            let receipt_handle = uuid::Uuid::new_v4().to_string();
            entry.lease = Some(Lease {
                receipt_handle: receipt_handle.clone(),
                until: now + visibility_timeout,
            });
            taken.push(QueueItem {
                message_id: entry.message_id.clone(),
                receipt_handle,
                body: entry.body.clone(),
                receive_count: entry.receive_count,
            });
            idx += 1;
        }

        let next_visible = entries
            .iter()
            .filter_map(|e| e.lease.as_ref().map(|l| l.until))
            .filter(|until| *until > now)
            .min();
        (taken, next_visible)
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn send(&self, body: &str) -> Result<String, DispatchError> {
        self.check()?;
        let message_id = uuid::Uuid::new_v4().to_string();
        self.state.lock().entries.push_back(Entry {
            message_id: message_id.clone(),
            body: body.to_string(),
            receive_count: 0,
            lease: None,
        });
        self.arrivals.notify_one();
        Ok(message_id)
    }

    async fn receive(
        &self,
        max_items: usize,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueItem>, DispatchError> {
        self.check()?;
        if max_items == 0 {
            return Ok(Vec::new());
        }

        let deadline = Instant::now() + wait;
        loop {
            let (items, next_visible) = self.take_visible(max_items, visibility_timeout);
            if !items.is_empty() || Instant::now() >= deadline {
                return Ok(items);
            }

            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = self.arrivals.notified() => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), DispatchError> {
        self.check()?;
        let mut state = self.state.lock();
        let position = state.entries.iter().position(|e| {
            e.lease
                .as_ref()
                .is_some_and(|l| l.receipt_handle == receipt_handle)
        });
        match position {
            Some(idx) => {
                state.entries.remove(idx);
                Ok(())
            }
            None => Err(DispatchError::Queue(format!(
                "receipt handle {receipt_handle} is not valid"
            ))),
        }
    }
}
