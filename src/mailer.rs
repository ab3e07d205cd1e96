//! Mailer trait and delivery result types.
//!
//! The trait uses `#[async_trait]` rather than native async fns so that the
//! worker can hold providers as `Arc<dyn Mailer>` and pick one at runtime
//! from the environment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::governor::SendQuota;

/// Provider response to a send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Message ID assigned by the provider
    pub message_id: String,
    /// HTTP-style status reported by the provider
    pub status: u16,
}

impl DeliveryResult {
    /// A successful (200) result.
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            status: 200,
        }
    }

    pub fn with_status(message_id: impl Into<String>, status: u16) -> Self {
        Self {
            message_id: message_id.into(),
            status,
        }
    }

    /// Only 2xx counts as accepted.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for mail-sending providers.
///
/// # Example
///
/// ```ignore
/// use hermes::Mailer;
/// use hermes::providers::AmazonSesMailer;
///
/// let mailer = AmazonSesMailer::new("us-east-1", access_key, secret_key);
///
/// let quota = mailer.quota().await?;
/// let result = mailer.deliver(&envelope).await?;
/// println!("Sent with ID: {}", result.message_id);
/// ```
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Current sending limits of the account.
    async fn quota(&self) -> Result<SendQuota, DispatchError>;

    /// Send a single envelope.
    async fn deliver(&self, envelope: &Envelope) -> Result<DeliveryResult, DispatchError>;

    /// Get the provider name (for logging/metrics).
    fn provider_name(&self) -> &'static str {
        "unknown"
    }

    /// Validate configuration.
    ///
    /// Called at startup to verify required configuration is present.
    fn validate_config(&self) -> Result<(), DispatchError> {
        Ok(())
    }
}

#[async_trait]
impl<M: Mailer + ?Sized> Mailer for std::sync::Arc<M> {
    async fn quota(&self) -> Result<SendQuota, DispatchError> {
        (**self).quota().await
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<DeliveryResult, DispatchError> {
        (**self).deliver(envelope).await
    }

    fn provider_name(&self) -> &'static str {
        (**self).provider_name()
    }

    fn validate_config(&self) -> Result<(), DispatchError> {
        (**self).validate_config()
    }
}
