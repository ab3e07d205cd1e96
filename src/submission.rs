//! Submission handler: admits an email into the pipeline.
//!
//! In tracked mode a submission is written to the message store as
//! `Pending`, its id is enqueued, and the record is advanced to
//! `QueuedForSend`. In inline mode the whole email is enqueued and the store
//! is not involved.
//!
//! A failure after the first write leaves the `Pending` record behind. The
//! [`Reconciler`](crate::Reconciler) picks those up.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

use crate::config::{DeliveryMode, DispatchConfig};
use crate::email::Email;
use crate::error::DispatchError;
use crate::payload::{Dispatchable, Payload};
use crate::queue::Queue;
use crate::record::MessageRecord;
use crate::store::{MessageStore, Store};

/// Upper bound on id generation attempts per submission.
pub const MAX_ID_ATTEMPTS: usize = 32;

/// Source of candidate message ids.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random UUID v4 ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// What the caller gets back for an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    /// Message store id (tracked mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub queue_message_id: String,
}

/// Why a submission was not accepted.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The email itself is unacceptable. Nothing was written.
    #[error("Invalid email: {0}")]
    Invalid(String),

    /// The pipeline could not admit the email.
    #[error("Submission failed: {0}")]
    Failed(#[source] DispatchError),
}

impl SubmitError {
    fn from_dispatch(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(msg) => Self::Invalid(msg),
            other => Self::Failed(other),
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::Invalid(_) => 400,
            Self::Failed(_) => 500,
        }
    }

    /// Client-facing problem document. Infrastructure detail is never included.
    pub fn problem(&self) -> ProblemDetails {
        match self {
            Self::Invalid(msg) => ProblemDetails {
                problem_type: "about:blank".into(),
                title: "Invalid email".into(),
                status: 400,
                detail: Some(msg.clone()),
            },
            Self::Failed(_) => ProblemDetails {
                problem_type: "about:blank".into(),
                title: "Submission failed".into(),
                status: 500,
                detail: Some("The message could not be accepted. Please retry later.".into()),
            },
        }
    }
}

/// RFC 9457 problem document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Admits emails into the store and queue.
#[derive(Clone)]
pub struct Submitter {
    store: Option<MessageStore>,
    queue: Arc<dyn Queue>,
    ids: Arc<dyn IdGenerator>,
}

impl Submitter {
    /// Tracked mode: records in `store`, ids on `queue`.
    pub fn tracked(store: MessageStore, queue: Arc<dyn Queue>) -> Self {
        Self {
            store: Some(store),
            queue,
            ids: Arc::new(UuidGenerator),
        }
    }

    /// Inline mode: whole emails on `queue`, no store.
    pub fn inline(queue: Arc<dyn Queue>) -> Self {
        Self {
            store: None,
            queue,
            ids: Arc::new(UuidGenerator),
        }
    }

    /// Build the submitter the configuration asks for.
    pub fn from_config(config: &DispatchConfig, store: Arc<dyn Store>, queue: Arc<dyn Queue>) -> Self {
        match config.delivery_mode {
            DeliveryMode::Tracked => Self::tracked(MessageStore::new(store, &config.table_name), queue),
            DeliveryMode::Inline => Self::inline(queue),
        }
    }

    /// Replace the id source.
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn mode(&self) -> DeliveryMode {
        if self.store.is_some() {
            DeliveryMode::Tracked
        } else {
            DeliveryMode::Inline
        }
    }

    /// Parse a JSON email and submit it.
    pub async fn submit_json(&self, json: &str) -> Result<SubmitReceipt, SubmitError> {
        let email: Email =
            serde_json::from_str(json).map_err(|e| SubmitError::Invalid(e.to_string()))?;
        self.submit(&email).await
    }

    /// Validate, record and enqueue an email.
    pub async fn submit(&self, email: &Email) -> Result<SubmitReceipt, SubmitError> {
        let span = tracing::info_span!("hermes.submit", mode = %self.mode());
        let result = self.submit_inner(email).instrument(span).await;

        #[cfg(feature = "metrics")]
        {
            let status = match &result {
                Ok(_) => "accepted",
                Err(SubmitError::Invalid(_)) => "rejected",
                Err(SubmitError::Failed(_)) => "failed",
            };
            metrics::counter!("hermes_submissions_total", "status" => status).increment(1);
        }

        result
    }

    async fn submit_inner(&self, email: &Email) -> Result<SubmitReceipt, SubmitError> {
        if let Err(e) = email.validate() {
            tracing::debug!(error = %e, "Submission rejected");
            return Err(SubmitError::from_dispatch(e));
        }

        let payload = Payload::from(email.clone());
        let content = payload.encode().map_err(SubmitError::Failed)?;

        let Some(store) = &self.store else {
            let queue_message_id = self.queue.send(&content).await.map_err(|e| {
                tracing::error!(error = %e, "Failed to enqueue inline message");
                SubmitError::Failed(e)
            })?;
            tracing::info!(queue_message_id = %queue_message_id, "Message accepted");
            return Ok(SubmitReceipt {
                id: None,
                queue_message_id,
            });
        };

        let mut record = self.allocate(store, &payload, content).await?;

        let queue_message_id = self.queue.send(&record.id).await.map_err(|e| {
            tracing::error!(id = %record.id, error = %e, "Failed to enqueue message; record left Pending");
            SubmitError::Failed(e)
        })?;

        record
            .mark_queued(queue_message_id.clone(), Utc::now())
            .map_err(SubmitError::Failed)?;
        store.save(&record).await.map_err(|e| {
            tracing::error!(id = %record.id, error = %e, "Failed to mark message queued");
            SubmitError::Failed(e)
        })?;

        tracing::info!(id = %record.id, queue_message_id = %queue_message_id, "Message accepted");
        Ok(SubmitReceipt {
            id: Some(record.id),
            queue_message_id,
        })
    }

    /// Write a `Pending` record under an id nobody else holds.
    async fn allocate(
        &self,
        store: &MessageStore,
        payload: &Payload,
        content: String,
    ) -> Result<MessageRecord, SubmitError> {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = self.ids.generate();

            if store.exists(&id).await.map_err(SubmitError::Failed)? {
                tracing::debug!(id = %id, attempt, "Id already taken, regenerating");
                continue;
            }

            let record = MessageRecord::new_pending(id, payload.kind(), content.clone(), Utc::now());
            if store.insert_new(&record).await.map_err(SubmitError::Failed)? {
                return Ok(record);
            }
            tracing::debug!(id = %record.id, attempt, "Lost id race, regenerating");
        }

        tracing::error!(attempts = MAX_ID_ATTEMPTS, "Could not allocate a unique message id");
        Err(SubmitError::Failed(DispatchError::Internal(format!(
            "no unique id after {MAX_ID_ATTEMPTS} attempts"
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_hides_internal_detail() {
        let err = SubmitError::Failed(DispatchError::Store("table HermesMessages throttled".into()));
        let problem = err.problem();
        assert_eq!(problem.status, 500);
        assert!(!problem.detail.unwrap().contains("HermesMessages"));

        let err = SubmitError::Invalid("subject is required".into());
        assert_eq!(err.status(), 400);
        assert_eq!(err.problem().detail.as_deref(), Some("subject is required"));
    }

    #[test]
    fn test_problem_json_shape() {
        let json = serde_json::to_value(SubmitError::Invalid("x".into()).problem()).unwrap();
        assert_eq!(json["type"], "about:blank");
        assert_eq!(json["status"], 400);
    }

    #[test]
    fn test_receipt_json() {
        let tracked = SubmitReceipt {
            id: Some("abc".into()),
            queue_message_id: "q-1".into(),
        };
        assert_eq!(
            serde_json::to_string(&tracked).unwrap(),
            r#"{"id":"abc","queueMessageId":"q-1"}"#
        );

        let inline = SubmitReceipt {
            id: None,
            queue_message_id: "q-2".into(),
        };
        assert_eq!(serde_json::to_string(&inline).unwrap(), r#"{"queueMessageId":"q-2"}"#);
    }

    #[test]
    fn test_uuid_generator() {
        let id = UuidGenerator.generate();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert_ne!(id, UuidGenerator.generate());
    }
}
