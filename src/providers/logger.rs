//! Logger mailer that only logs envelopes.
//!
//! Useful for staging environments or when you want to see what would be sent
//! without actually sending anything.

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::governor::SendQuota;
use crate::mailer::{DeliveryResult, Mailer};

/// Logger mailer that emits tracing events for envelopes.
#[derive(Debug, Clone)]
pub struct LoggerMailer {
    /// If true, log full envelope details. If false, just log recipient summary.
    log_full: bool,
    quota: SendQuota,
}

impl LoggerMailer {
    /// Create a logger mailer with brief output (just recipients).
    pub fn new() -> Self {
        Self {
            log_full: false,
            quota: SendQuota::new(14.0, 50_000.0, 0.0),
        }
    }

    /// Create a logger mailer with full envelope details.
    pub fn full() -> Self {
        Self::new().log_full(true)
    }

    /// Set whether to log full envelope details.
    pub fn log_full(mut self, full: bool) -> Self {
        self.log_full = full;
        self
    }

    /// Quota to report, so pacing can be observed without a real provider.
    pub fn with_quota(mut self, quota: SendQuota) -> Self {
        self.quota = quota;
        self
    }
}

impl Default for LoggerMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for LoggerMailer {
    async fn quota(&self) -> Result<SendQuota, DispatchError> {
        Ok(self.quota)
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<DeliveryResult, DispatchError> {
        let message_id = uuid::Uuid::new_v4().to_string();

        if self.log_full {
            tracing::info!(
                message_id = %message_id,
                from = %envelope.from,
                to = ?envelope.to,
                cc = ?envelope.cc,
                bcc = ?envelope.bcc,
                reply_to = ?envelope.reply_to,
                subject = %envelope.subject,
                attachments = envelope.attachments.len(),
                "Email logged (full)"
            );
            tracing::debug!(body = %envelope.html_body, "HTML body");
        } else {
            tracing::info!(
                message_id = %message_id,
                to = ?envelope.to,
                subject = %envelope.subject,
                "Email logged"
            );
        }

        Ok(DeliveryResult::new(message_id))
    }

    fn provider_name(&self) -> &'static str {
        "logger"
    }
}
