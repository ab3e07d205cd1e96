//! Dispatch worker: drains the queue through the mail provider.
//!
//! Items are processed one at a time. Each is resolved to a payload,
//! rendered to a sanitized envelope, paced by the [`RateGovernor`], and
//! handed to the [`Mailer`]. Every item gets its own outcome so the queue
//! redelivers only the ones that failed.
//!
//! Two ways in:
//!
//! - **push**: [`DispatchWorker::handle_batch`] with a batch the queue
//!   already delivered (a Lambda-style SQS trigger). The response lists the
//!   failed items.
//! - **pull**: [`DispatchWorker::run`] / [`DispatchWorker::poll_once`] receive
//!   from the queue themselves and delete what succeeded.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

use crate::config::{DeliveryMode, DispatchConfig};
use crate::error::DispatchError;
use crate::governor::RateGovernor;
use crate::mailer::Mailer;
use crate::payload::{Dispatchable, MessageKind, Payload};
use crate::queue::{Queue, QueueItem};
use crate::record::{MessageRecord, MessageState};
use crate::shutdown::Shutdown;
use crate::store::{MessageStore, Store};

#[cfg(feature = "metrics")]
use std::time::Instant;

/// How a batch reached the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    Push,
    Pull,
}

impl BatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }
}

/// Outcome of one queue item.
#[derive(Debug, Clone)]
pub struct ItemReport {
    pub message_id: String,
    pub receipt_handle: String,
    /// Provider message id on success
    pub result: Result<String, DispatchError>,
}

impl ItemReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-item outcomes of a batch, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub items: Vec<ItemReport>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|r| !r.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    /// Partial-batch response for the queue trigger.
    pub fn to_response(&self) -> BatchResponse {
        BatchResponse {
            batch_item_failures: self
                .failed()
                .map(|r| BatchItemFailure {
                    item_identifier: r.message_id.clone(),
                })
                .collect(),
        }
    }
}

/// `{"batchItemFailures": [{"itemIdentifier": "..."}]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Result of one pull cycle.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// A batch was received and processed.
    Processed(BatchOutcome),
    /// The queue had nothing to hand out.
    Idle,
    /// No daily allowance left; nothing was received.
    QuotaExhausted,
}

/// Consumes queue items and sends them through the provider.
pub struct DispatchWorker {
    config: DispatchConfig,
    mailer: Arc<dyn Mailer>,
    queue: Arc<dyn Queue>,
    store: Option<MessageStore>,
    governor: Arc<RateGovernor>,
}

impl DispatchWorker {
    /// Tracked mode: queue items carry record ids looked up in `store`.
    pub fn tracked(
        config: DispatchConfig,
        mailer: Arc<dyn Mailer>,
        queue: Arc<dyn Queue>,
        store: Arc<dyn Store>,
    ) -> Self {
        let store = MessageStore::new(store, &config.table_name);
        Self {
            config: config.delivery_mode(DeliveryMode::Tracked),
            mailer,
            queue,
            store: Some(store),
            governor: RateGovernor::shared(),
        }
    }

    /// Inline mode: queue items carry whole emails.
    pub fn inline(config: DispatchConfig, mailer: Arc<dyn Mailer>, queue: Arc<dyn Queue>) -> Self {
        Self {
            config: config.delivery_mode(DeliveryMode::Inline),
            mailer,
            queue,
            store: None,
            governor: RateGovernor::shared(),
        }
    }

    /// Build the worker the configuration asks for.
    pub fn from_config(
        config: DispatchConfig,
        mailer: Arc<dyn Mailer>,
        queue: Arc<dyn Queue>,
        store: Arc<dyn Store>,
    ) -> Self {
        match config.delivery_mode {
            DeliveryMode::Tracked => Self::tracked(config, mailer, queue, store),
            DeliveryMode::Inline => Self::inline(config, mailer, queue),
        }
    }

    /// Share a governor with other workers using the same provider account.
    pub fn with_governor(mut self, governor: Arc<RateGovernor>) -> Self {
        self.governor = governor;
        self
    }

    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    // =========================================================================
    // Push mode
    // =========================================================================

    /// Process a batch delivered by a queue trigger.
    ///
    /// Returns `Err` only when the provider quota cannot be read; in that case
    /// nothing was sent and the whole batch should be retried.
    pub async fn handle_batch(
        &self,
        items: Vec<QueueItem>,
        shutdown: &Shutdown,
    ) -> Result<BatchResponse, DispatchError> {
        if let Err(e) = self.governor.refresh(&*self.mailer).await {
            tracing::error!(error = %e, items = items.len(), "Cannot read send quota; failing invocation");
            return Err(e);
        }
        let outcome = self.process_batch(&items, BatchMode::Push, shutdown).await;
        Ok(outcome.to_response())
    }

    // =========================================================================
    // Pull mode
    // =========================================================================

    /// Poll until `shutdown` fires.
    pub async fn run(&self, shutdown: Shutdown) {
        tracing::info!(
            mode = %self.config.delivery_mode,
            provider = self.mailer.provider_name(),
            "Dispatch worker started"
        );

        while !shutdown.is_cancelled() {
            let backoff = match self.poll_once(&shutdown).await {
                Ok(PollOutcome::Processed(_)) => continue,
                Ok(PollOutcome::Idle) => self.config.idle_backoff,
                Ok(PollOutcome::QuotaExhausted) => {
                    tracing::warn!(
                        backoff_secs = self.config.exhausted_backoff.as_secs(),
                        "Daily send quota exhausted; backing off"
                    );
                    self.config.exhausted_backoff
                }
                Err(e) => {
                    tracing::error!(error = %e, "Poll cycle failed");
                    self.config.idle_backoff
                }
            };

            if shutdown.sleep(backoff).await.is_err() {
                break;
            }
        }

        tracing::info!("Dispatch worker stopped");
    }

    /// One pull cycle: refresh quota, receive, process, delete what succeeded.
    pub async fn poll_once(&self, shutdown: &Shutdown) -> Result<PollOutcome, DispatchError> {
        let quota = self.governor.refresh(&*self.mailer).await?;
        if quota.remaining == 0 {
            return Ok(PollOutcome::QuotaExhausted);
        }

        let max_items = self
            .config
            .batch_size
            .min(usize::try_from(quota.remaining).unwrap_or(usize::MAX));
        let items = self
            .queue
            .receive(max_items, self.config.wait, self.config.visibility_timeout)
            .await?;
        if items.is_empty() {
            return Ok(PollOutcome::Idle);
        }

        let outcome = self.process_batch(&items, BatchMode::Pull, shutdown).await;
        for report in outcome.succeeded() {
            if let Err(e) = self.queue.delete(&report.receipt_handle).await {
                // Redelivery is caught by the state guard
                tracing::warn!(
                    queue_message_id = %report.message_id,
                    error = %e,
                    "Failed to delete sent item from queue"
                );
            }
        }
        Ok(PollOutcome::Processed(outcome))
    }

    // =========================================================================
    // Batch processing
    // =========================================================================

    /// Process items in order. The quota must already be refreshed.
    pub async fn process_batch(
        &self,
        items: &[QueueItem],
        mode: BatchMode,
        shutdown: &Shutdown,
    ) -> BatchOutcome {
        let span = tracing::info_span!(
            "hermes.dispatch_batch",
            mode = mode.as_str(),
            delivery = %self.config.delivery_mode,
            items = items.len(),
        );

        async {
            let mut outcome = BatchOutcome::default();
            let mut halted: Option<DispatchError> = None;

            for item in items {
                let result = match &halted {
                    Some(reason) => Err(reason.clone()),
                    None if shutdown.is_cancelled() => Err(DispatchError::Cancelled),
                    None => {
                        let item_span = tracing::info_span!(
                            "hermes.dispatch_item",
                            queue_message_id = %item.message_id,
                            receive_count = item.receive_count,
                        );
                        self.dispatch_item(item, shutdown).instrument(item_span).await
                    }
                };

                if let Err(e) = &result {
                    if halted.is_none()
                        && matches!(e, DispatchError::QuotaExhausted | DispatchError::Cancelled)
                    {
                        tracing::warn!(reason = e.class(), "Halting batch; remaining items left for retry");
                        halted = Some(e.clone());
                    }
                    tracing::warn!(
                        queue_message_id = %item.message_id,
                        error = %e,
                        class = e.class(),
                        retryable = e.is_retryable(),
                        "Item failed"
                    );
                }

                outcome.items.push(ItemReport {
                    message_id: item.message_id.clone(),
                    receipt_handle: item.receipt_handle.clone(),
                    result,
                });
            }

            tracing::info!(
                sent = outcome.success_count(),
                failed = outcome.failure_count(),
                "Batch processed"
            );

            #[cfg(feature = "metrics")]
            {
                metrics::counter!("hermes_batch_total", "mode" => mode.as_str()).increment(1);
                metrics::counter!("hermes_batch_failures_total", "mode" => mode.as_str())
                    .increment(outcome.failure_count() as u64);
            }

            outcome
        }
        .instrument(span)
        .await
    }

    async fn dispatch_item(
        &self,
        item: &QueueItem,
        shutdown: &Shutdown,
    ) -> Result<String, DispatchError> {
        let (payload, record) = self.resolve(item).await?;
        let envelope = payload.to_envelope(&self.config.default_from)?;

        self.governor.try_reserve()?;
        if let Err(e) = self.governor.wait_for_slot(shutdown).await {
            self.governor.refund();
            return Err(e);
        }

        let provider = self.mailer.provider_name();
        #[cfg(feature = "metrics")]
        let started = Instant::now();

        let result = match self.mailer.deliver(&envelope).await {
            Ok(delivery) if delivery.is_success() => Ok(delivery),
            Ok(delivery) => Err(DispatchError::provider_with_status(
                provider,
                format!("provider answered with status {}", delivery.status),
                delivery.status,
            )),
            Err(e) => Err(e),
        };

        #[cfg(feature = "metrics")]
        {
            let status = if result.is_ok() { "success" } else { "error" };
            metrics::counter!("hermes_emails_total", "provider" => provider, "status" => status)
                .increment(1);
            metrics::histogram!("hermes_delivery_duration_seconds", "provider" => provider)
                .record(started.elapsed().as_secs_f64());
        }

        let delivery = match result {
            Ok(delivery) => delivery,
            Err(e) => {
                self.governor.refund();
                return Err(e);
            }
        };
        self.governor.record_send();
        tracing::info!(provider, provider_message_id = %delivery.message_id, "Email sent");

        if let (Some(store), Some(mut record)) = (&self.store, record) {
            let saved = match record.mark_sent(delivery.message_id.clone(), Utc::now()) {
                Ok(()) => store.save(&record).await,
                Err(e) => Err(e),
            };
            if let Err(e) = saved {
                // The email is out; failing the item would send it again
                tracing::error!(
                    id = %record.id,
                    provider_message_id = %delivery.message_id,
                    error = %e,
                    "Sent but could not record Sent state"
                );
            }
        }

        Ok(delivery.message_id)
    }

    /// Turn a queue item into a payload, checking the record in tracked mode.
    async fn resolve(
        &self,
        item: &QueueItem,
    ) -> Result<(Payload, Option<MessageRecord>), DispatchError> {
        let Some(store) = &self.store else {
            return Ok((Payload::decode(MessageKind::Email, &item.body)?, None));
        };

        let id = item.body.trim();
        let record = store
            .get(id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(id.to_string()))?;

        if record.state != MessageState::QueuedForSend {
            return Err(DispatchError::InvalidState {
                id: record.id,
                state: record.state,
                expected: MessageState::QueuedForSend,
            });
        }

        let kind = record.message_kind()?;
        let payload = Payload::decode(kind, &record.content)?;
        Ok((payload, Some(record)))
    }
}
