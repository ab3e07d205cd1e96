//! Error types for hermes.

use thiserror::Error;

use crate::record::MessageState;

/// Errors raised anywhere in the dispatch pipeline.
///
/// Variants fall into two classes, see [`DispatchError::is_retryable`]:
/// problems with the message itself are never going to succeed on redelivery,
/// while provider, store and queue hiccups are expected to clear up.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Configuration error (missing env var, invalid value, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Missing or invalid field in a submitted email.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Queue item references a record that does not exist.
    #[error("Message record not found: {0}")]
    NotFound(String),

    /// Record exists but is not in the state the caller expected.
    #[error("Message {id} is in state {state}, expected {expected}")]
    InvalidState {
        id: String,
        state: MessageState,
        expected: MessageState,
    },

    /// A write tried to move a record backwards or out of a terminal state.
    #[error("Illegal state transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: MessageState,
        to: MessageState,
    },

    /// Record carries a message kind this pipeline cannot dispatch.
    #[error("Unsupported message kind: {0}")]
    UnsupportedKind(String),

    /// Daily send allowance is used up.
    #[error("Daily send quota exhausted")]
    QuotaExhausted,

    /// The provider's quota could not be read; sending with unknown pacing is not allowed.
    #[error("Send quota unavailable: {0}")]
    QuotaUnavailable(String),

    /// Provider-specific error with details.
    #[error("Provider error ({provider}): {message}")]
    Provider {
        provider: &'static str,
        message: String,
        /// Optional HTTP status code
        status: Option<u16>,
    },

    /// Message store could not be reached or rejected the request.
    #[error("Store error: {0}")]
    Store(String),

    /// Queue could not be reached or rejected the request.
    #[error("Queue error: {0}")]
    Queue(String),

    /// Processing was cancelled before the item could be sent.
    #[error("Cancelled before send")]
    Cancelled,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Create a provider-specific error.
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            status: None,
        }
    }

    /// Create a provider error with HTTP status.
    pub fn provider_with_status(
        provider: &'static str,
        message: impl Into<String>,
        status: u16,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            status: Some(status),
        }
    }

    /// Whether redelivering the same item could plausibly succeed.
    ///
    /// Non-retryable items are still reported as failed to the queue; they
    /// end up in the dead-letter path once the receive limit is hit.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Validation(_)
                | Self::NotFound(_)
                | Self::InvalidState { .. }
                | Self::InvalidTransition { .. }
                | Self::UnsupportedKind(_)
                | Self::Configuration(_)
        )
    }

    /// Short label used for log fields and metric labels.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::UnsupportedKind(_) => "unsupported_kind",
            Self::QuotaExhausted => "quota_exhausted",
            Self::QuotaUnavailable(_) => "quota_unavailable",
            Self::Provider { .. } => "provider",
            Self::Store(_) => "store",
            Self::Queue(_) => "queue",
            Self::Cancelled => "cancelled",
            Self::Http(_) => "http",
            Self::Json(_) => "json",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(feature = "_http")]
impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
