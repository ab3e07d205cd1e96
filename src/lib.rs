//! # Hermes
//!
//! Durable, rate-governed email dispatch. Emails are accepted quickly,
//! parked on a queue, and sent by a worker that paces itself against the
//! provider's published quota.
//!
//! ## Quick Start
//!
//! Set environment variables:
//! ```bash
//! EMAIL_PROVIDER=amazon_ses
//! AWS_REGION=us-east-1
//! AWS_ACCESS_KEY_ID=AKIA...
//! AWS_SECRET_ACCESS_KEY=...
//! EMAIL_FROM=noreply@example.com
//! EMAIL_FROM_NAME=My App
//! ```
//!
//! Submit from the request path:
//! ```rust,ignore
//! use hermes::{Email, Submitter};
//!
//! let email = Email::new()
//!     .to("user@example.com")
//!     .subject("Welcome!")
//!     .body("<p>Hello</p>");
//!
//! let receipt = submitter.submit(&email).await?;
//! ```
//!
//! Drain the queue from a worker:
//! ```rust,ignore
//! use hermes::{mailer_from_env, shutdown, DispatchConfig, DispatchWorker};
//!
//! let config = DispatchConfig::from_env()?;
//! let worker = DispatchWorker::from_config(config, mailer_from_env()?, queue, store);
//!
//! let (trigger, shutdown) = shutdown::channel();
//! worker.run(shutdown).await;
//! ```
//!
//! ## Message Lifecycle
//!
//! In tracked mode every submission is a record in the message store:
//!
//! ```text
//! Pending -> QueuedForSend -> Sent
//!    \            \
//!     `------------`-----> Failed
//! ```
//!
//! The worker only sends records in `QueuedForSend`, so a duplicate queue
//! delivery of an already sent message is rejected instead of sent twice.
//! In inline mode the queue carries the email itself and there is no record.
//!
//! ## Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `EMAIL_PROVIDER` | `amazon_ses`, `local`, `logger` |
//! | `EMAIL_FROM` | Default sender email |
//! | `EMAIL_FROM_NAME` | Default sender name |
//! | `AWS_REGION` | AWS region for SES |
//! | `AWS_ACCESS_KEY_ID` | AWS access key |
//! | `AWS_SECRET_ACCESS_KEY` | AWS secret key |
//! | `AWS_SESSION_TOKEN` | AWS session token (optional) |
//! | `HERMES_TABLE_NAME` | Message store table (default: `HermesMessages`) |
//! | `HERMES_DELIVERY_MODE` | `tracked` or `inline` (default: `tracked`) |
//! | `HERMES_BATCH_SIZE` | Items per receive, 1-10 (default: 10) |
//!
//! See [`DispatchConfig`] for the polling and backoff settings.
//!
//! ## Feature Flags
//!
//! - `amazon_ses` - Amazon SES v2 API provider
//! - `local` - LocalMailer and the [`testing`] assertions
//! - `axum` - HTTP submission endpoint ([`api`])
//! - `metrics` - Prometheus-style metrics (counters/histograms)
//! - `full` - All of the above
//!
//! ## Metrics
//!
//! Enable `features = ["metrics"]` to emit Prometheus-style metrics:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `hermes_submissions_total` | Counter | status | Submissions accepted, rejected or failed |
//! | `hermes_emails_total` | Counter | provider, status | Delivery attempts |
//! | `hermes_delivery_duration_seconds` | Histogram | provider | Delivery duration |
//! | `hermes_batch_total` | Counter | mode | Batches processed |
//! | `hermes_batch_failures_total` | Counter | mode | Items reported failed |
//!
//! Install a recorder (e.g., `metrics-exporter-prometheus`) in your app to collect them.

/// The version of the hermes crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod address;
mod attachment;
mod config;
mod email;
mod envelope;
mod error;
mod governor;
mod mailer;
mod payload;
mod queue;
mod reconcile;
mod record;
mod store;
mod submission;
mod worker;

pub mod providers;
pub mod sanitize;
pub mod shutdown;

#[cfg(feature = "local")]
pub mod testing;

#[cfg(feature = "axum")]
pub mod api;

// Re-exports
pub use address::{Address, ToAddress};
pub use attachment::Attachment;
pub use config::{
    mailer_from_env, mailer_from_lookup, DeliveryMode, DispatchConfig, DEFAULT_TABLE_NAME,
    MAX_BATCH_SIZE,
};
pub use email::Email;
pub use envelope::{Envelope, EnvelopeAttachment};
pub use error::DispatchError;
pub use governor::{AtomicSendBudget, QuotaSnapshot, RateGovernor, SendBudget, SendQuota};
pub use mailer::{DeliveryResult, Mailer};
pub use payload::{Dispatchable, MessageKind, Payload};
pub use queue::{MemoryQueue, Queue, QueueItem, DEFAULT_MAX_RECEIVE_COUNT};
pub use reconcile::{Reconciler, SweepReport};
pub use record::{attr, Item, MessageRecord, MessageState};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use store::{MemoryStore, MessageStore, Store};
pub use submission::{
    IdGenerator, ProblemDetails, SubmitError, SubmitReceipt, Submitter, UuidGenerator,
    MAX_ID_ATTEMPTS,
};
pub use worker::{
    BatchItemFailure, BatchMode, BatchOutcome, BatchResponse, DispatchWorker, ItemReport,
    PollOutcome,
};
