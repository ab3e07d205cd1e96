//! Orphan sweep for records stuck in `Pending`.
//!
//! A submission that wrote its record but then failed to enqueue (or to mark
//! the record queued) leaves a `Pending` record nobody will ever dispatch.
//! [`Reconciler::sweep`] finds those once they are older than a grace period
//! and re-enqueues them. If the original enqueue did succeed, the second
//! queue reference is harmless: the worker only sends `QueuedForSend`
//! records, so whichever delivery comes second is rejected.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::error::DispatchError;
use crate::payload::Payload;
use crate::queue::Queue;
use crate::record::{MessageRecord, MessageState};
use crate::store::MessageStore;

/// Counts from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records examined
    pub scanned: usize,
    /// `Pending` records old enough to act on
    pub orphaned: usize,
    pub requeued: usize,
    /// Moved to `Failed` because their content no longer decodes
    pub failed: usize,
    /// Records left untouched because a store or queue call failed
    pub errors: usize,
}

/// Re-enqueues orphaned `Pending` records.
pub struct Reconciler {
    store: MessageStore,
    queue: Arc<dyn Queue>,
}

impl Reconciler {
    pub fn new(store: MessageStore, queue: Arc<dyn Queue>) -> Self {
        Self { store, queue }
    }

    /// Sweep the table for `Pending` records created more than `grace` ago.
    ///
    /// Only a failed scan aborts the sweep; per-record problems are logged and
    /// counted in [`SweepReport::errors`].
    pub async fn sweep(&self, grace: Duration) -> Result<SweepReport, DispatchError> {
        let span = tracing::info_span!("hermes.reconcile", table = self.store.table());
        self.sweep_inner(grace).instrument(span).await
    }

    async fn sweep_inner(&self, grace: Duration) -> Result<SweepReport, DispatchError> {
        let records = self.store.scan().await?;
        let grace = chrono::Duration::from_std(grace)
            .map_err(|e| DispatchError::Configuration(format!("grace period out of range: {e}")))?;
        let cutoff = Utc::now() - grace;

        let mut report = SweepReport {
            scanned: records.len(),
            ..Default::default()
        };

        for record in records {
            if record.state != MessageState::Pending || record.created_at > cutoff {
                continue;
            }
            report.orphaned += 1;

            match self.recover(record).await {
                Ok(MessageState::QueuedForSend) => report.requeued += 1,
                Ok(_) => report.failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to recover orphaned record");
                    report.errors += 1;
                }
            }
        }

        if report.orphaned > 0 {
            tracing::info!(
                orphaned = report.orphaned,
                requeued = report.requeued,
                failed = report.failed,
                errors = report.errors,
                "Reconcile sweep finished"
            );
        }
        Ok(report)
    }

    async fn recover(&self, mut record: MessageRecord) -> Result<MessageState, DispatchError> {
        let decoded = record
            .message_kind()
            .and_then(|kind| Payload::decode(kind, &record.content));

        if let Err(e) = decoded {
            tracing::warn!(id = %record.id, error = %e, "Orphaned record cannot be decoded; marking Failed");
            record.mark_failed(e.to_string(), Utc::now())?;
            self.store.save(&record).await?;
            return Ok(MessageState::Failed);
        }

        let queue_message_id = self.queue.send(&record.id).await?;
        record.mark_queued(queue_message_id.clone(), Utc::now())?;
        self.store.save(&record).await?;

        tracing::info!(id = %record.id, queue_message_id = %queue_message_id, "Orphaned record re-enqueued");
        Ok(MessageState::QueuedForSend)
    }
}
