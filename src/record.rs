//! Message records and their lifecycle.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::DispatchError;
use crate::payload::MessageKind;

/// A store item: attribute name to scalar string value.
pub type Item = BTreeMap<String, String>;

/// Attribute names used in store items.
pub mod attr {
    pub const ID: &str = "id";
    pub const KIND: &str = "kind";
    pub const STATE: &str = "state";
    pub const CONTENT: &str = "content";
    pub const CREATED_AT: &str = "createdAt";
    pub const QUEUED_AT: &str = "queuedAt";
    pub const QUEUE_MESSAGE_ID: &str = "queueMessageId";
    pub const SENT_AT: &str = "sentAt";
    pub const PROVIDER_MESSAGE_ID: &str = "providerMessageId";
    pub const FAILED_AT: &str = "failedAt";
    pub const FAILURE_REASON: &str = "failureReason";
}

/// Lifecycle state of a message.
///
/// ```text
/// Pending -> QueuedForSend -> Sent
///    \            \
///     +------------+--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageState {
    Pending,
    QueuedForSend,
    Sent,
    Failed,
}

impl MessageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::QueuedForSend => "QueuedForSend",
            Self::Sent => "Sent",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }

    /// Whether a record may move from `self` to `next`.
    pub fn can_transition_to(&self, next: MessageState) -> bool {
        use MessageState::*;
        match (self, next) {
            (Pending, QueuedForSend) | (QueuedForSend, Sent) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageState {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "QueuedForSend" => Ok(Self::QueuedForSend),
            "Sent" => Ok(Self::Sent),
            "Failed" => Ok(Self::Failed),
            other => Err(DispatchError::Validation(format!("unknown message state '{other}'"))),
        }
    }
}

/// One submitted message and its progress through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: String,
    /// Raw kind discriminator. Kept as text so records of unknown kinds can
    /// still be loaded and rejected explicitly.
    pub kind: String,
    pub state: MessageState,
    /// Serialized message
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub queue_message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub provider_message_id: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl MessageRecord {
    /// A freshly admitted record.
    pub fn new_pending(
        id: impl Into<String>,
        kind: MessageKind,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.as_str().to_string(),
            state: MessageState::Pending,
            content: content.into(),
            created_at,
            queued_at: None,
            queue_message_id: None,
            sent_at: None,
            provider_message_id: None,
            failed_at: None,
            failure_reason: None,
        }
    }

    /// Parse the kind discriminator.
    pub fn message_kind(&self) -> Result<MessageKind, DispatchError> {
        self.kind.parse()
    }

    fn advance(&mut self, next: MessageState) -> Result<(), DispatchError> {
        if !self.state.can_transition_to(next) {
            return Err(DispatchError::InvalidTransition {
                id: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn mark_queued(
        &mut self,
        queue_message_id: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        self.advance(MessageState::QueuedForSend)?;
        self.queue_message_id = Some(queue_message_id.into());
        self.queued_at = Some(at);
        Ok(())
    }

    pub fn mark_sent(
        &mut self,
        provider_message_id: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        self.advance(MessageState::Sent)?;
        self.provider_message_id = Some(provider_message_id.into());
        self.sent_at = Some(at);
        Ok(())
    }

    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        self.advance(MessageState::Failed)?;
        self.failure_reason = Some(reason.into());
        self.failed_at = Some(at);
        Ok(())
    }

    /// Flatten into a store item.
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(attr::ID.into(), self.id.clone());
        item.insert(attr::KIND.into(), self.kind.clone());
        item.insert(attr::STATE.into(), self.state.as_str().into());
        item.insert(attr::CONTENT.into(), self.content.clone());
        item.insert(attr::CREATED_AT.into(), timestamp(&self.created_at));

        let optional = [
            (attr::QUEUED_AT, self.queued_at.as_ref().map(timestamp)),
            (attr::QUEUE_MESSAGE_ID, self.queue_message_id.clone()),
            (attr::SENT_AT, self.sent_at.as_ref().map(timestamp)),
            (attr::PROVIDER_MESSAGE_ID, self.provider_message_id.clone()),
            (attr::FAILED_AT, self.failed_at.as_ref().map(timestamp)),
            (attr::FAILURE_REASON, self.failure_reason.clone()),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                item.insert(name.into(), value);
            }
        }
        item
    }

    /// Rebuild a record from a store item.
    pub fn from_item(item: &Item) -> Result<Self, DispatchError> {
        let id = required(item, attr::ID, "<unknown>")?;
        Ok(Self {
            kind: required(item, attr::KIND, &id)?,
            state: required(item, attr::STATE, &id)?.parse()?,
            content: required(item, attr::CONTENT, &id)?,
            created_at: parse_timestamp(&required(item, attr::CREATED_AT, &id)?)?,
            queued_at: optional_timestamp(item, attr::QUEUED_AT)?,
            queue_message_id: item.get(attr::QUEUE_MESSAGE_ID).cloned(),
            sent_at: optional_timestamp(item, attr::SENT_AT)?,
            provider_message_id: item.get(attr::PROVIDER_MESSAGE_ID).cloned(),
            failed_at: optional_timestamp(item, attr::FAILED_AT)?,
            failure_reason: item.get(attr::FAILURE_REASON).cloned(),
            id,
        })
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, DispatchError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DispatchError::Validation(format!("bad timestamp '{text}': {e}")))
}

fn optional_timestamp(item: &Item, name: &str) -> Result<Option<DateTime<Utc>>, DispatchError> {
    item.get(name).map(|t| parse_timestamp(t)).transpose()
}

fn required(item: &Item, name: &str, id: &str) -> Result<String, DispatchError> {
    item.get(name)
        .cloned()
        .ok_or_else(|| DispatchError::Validation(format!("record {id} is missing '{name}'")))
}
