//! Runtime configuration, resolved once at process start.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `HERMES_TABLE_NAME` | Message store table | `HermesMessages` |
//! | `EMAIL_FROM` | Default sender email | required |
//! | `EMAIL_FROM_NAME` | Default sender name | none |
//! | `HERMES_DELIVERY_MODE` | `tracked` or `inline` | `tracked` |
//! | `HERMES_BATCH_SIZE` | Max items per receive (1-10) | `10` |
//! | `HERMES_WAIT_SECONDS` | Receive long-poll wait | `10` |
//! | `HERMES_VISIBILITY_TIMEOUT_SECONDS` | Lease duration | `10` |
//! | `HERMES_IDLE_BACKOFF_SECONDS` | Sleep when the queue is empty | `60` |
//! | `HERMES_EXHAUSTED_BACKOFF_SECONDS` | Sleep when the daily quota is used up | `3600` |
//!
//! Provider selection is separate, see [`mailer_from_env`]:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `EMAIL_PROVIDER` | `amazon_ses`, `local`, `logger` |
//! | `AWS_REGION`, `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` | SES credentials |
//! | `AWS_SESSION_TOKEN` | Optional, for temporary credentials |

use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::address::Address;
use crate::error::DispatchError;
use crate::mailer::Mailer;
use crate::providers;

pub const DEFAULT_TABLE_NAME: &str = "HermesMessages";
/// Upper bound on items per receive, matching SQS.
pub const MAX_BATCH_SIZE: usize = 10;

/// What the queue carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// The queue carries record ids; state lives in the message store.
    #[default]
    Tracked,
    /// The queue carries the whole serialized email; no store involved.
    Inline,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tracked => "tracked",
            Self::Inline => "inline",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMode {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tracked" => Ok(Self::Tracked),
            "inline" => Ok(Self::Inline),
            other => Err(DispatchError::Configuration(format!(
                "Unknown HERMES_DELIVERY_MODE: {other}. Valid modes are: tracked, inline"
            ))),
        }
    }
}

/// Settings shared by the submission handler and the dispatch worker.
///
/// ```
/// use hermes::{DeliveryMode, DispatchConfig};
/// use std::time::Duration;
///
/// let config = DispatchConfig::new(("My App", "noreply@example.com"))
///     .table_name("Outbox")
///     .delivery_mode(DeliveryMode::Inline)
///     .batch_size(25)
///     .idle_backoff(Duration::from_secs(5));
///
/// assert_eq!(config.batch_size, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    pub table_name: String,
    /// Sender used when a message has no `from`
    pub default_from: Address,
    pub delivery_mode: DeliveryMode,
    pub batch_size: usize,
    pub wait: Duration,
    pub visibility_timeout: Duration,
    pub idle_backoff: Duration,
    pub exhausted_backoff: Duration,
}

impl DispatchConfig {
    /// Defaults for everything except the sender.
    pub fn new(default_from: impl Into<Address>) -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            default_from: default_from.into(),
            delivery_mode: DeliveryMode::Tracked,
            batch_size: MAX_BATCH_SIZE,
            wait: Duration::from_secs(10),
            visibility_timeout: Duration::from_secs(10),
            idle_backoff: Duration::from_secs(60),
            exhausted_backoff: Duration::from_secs(3600),
        }
    }

    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    /// Clamped to `1..=10`.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    pub fn exhausted_backoff(mut self, backoff: Duration) -> Self {
        self.exhausted_backoff = backoff;
        self
    }

    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, DispatchError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DispatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let from = lookup("EMAIL_FROM")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| DispatchError::Configuration("EMAIL_FROM not set".into()))?;
        let default_from = match lookup("EMAIL_FROM_NAME").filter(|v| !v.is_empty()) {
            Some(name) => Address::with_name(name, from),
            None => Address::new(from),
        };
        default_from.validate().map_err(|e| {
            DispatchError::Configuration(format!("EMAIL_FROM is invalid: {e}"))
        })?;

        let mut config = Self::new(default_from);
        if let Some(table) = lookup("HERMES_TABLE_NAME").filter(|v| !v.is_empty()) {
            config.table_name = table;
        }
        if let Some(mode) = lookup("HERMES_DELIVERY_MODE") {
            config.delivery_mode = mode.parse()?;
        }
        if let Some(size) = number(&lookup, "HERMES_BATCH_SIZE")? {
            config = config.batch_size(size as usize);
        }
        if let Some(secs) = number(&lookup, "HERMES_WAIT_SECONDS")? {
            config.wait = Duration::from_secs(secs);
        }
        if let Some(secs) = number(&lookup, "HERMES_VISIBILITY_TIMEOUT_SECONDS")? {
            config.visibility_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = number(&lookup, "HERMES_IDLE_BACKOFF_SECONDS")? {
            config.idle_backoff = Duration::from_secs(secs);
        }
        if let Some(secs) = number(&lookup, "HERMES_EXHAUSTED_BACKOFF_SECONDS")? {
            config.exhausted_backoff = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn number<F>(lookup: &F, name: &str) -> Result<Option<u64>, DispatchError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|_| {
                DispatchError::Configuration(format!("{name} must be a whole number, got '{raw}'"))
            })
        })
        .transpose()
}

/// Create the mail provider named by `EMAIL_PROVIDER`.
pub fn mailer_from_env() -> Result<Arc<dyn Mailer>, DispatchError> {
    mailer_from_lookup(|name| env::var(name).ok())
}

/// Create a mail provider using an arbitrary variable lookup.
pub fn mailer_from_lookup<F>(lookup: F) -> Result<Arc<dyn Mailer>, DispatchError>
where
    F: Fn(&str) -> Option<String>,
{
    let provider = lookup("EMAIL_PROVIDER")
        .map(|p| p.to_lowercase())
        .ok_or_else(|| DispatchError::Configuration("EMAIL_PROVIDER not set".into()))?;

    let mailer: Arc<dyn Mailer> = match provider.as_str() {
        #[cfg(feature = "amazon_ses")]
        "amazon_ses" => {
            let require = |name: &str| {
                lookup(name).ok_or_else(|| DispatchError::Configuration(format!("{name} not set")))
            };
            let mut mailer = providers::AmazonSesMailer::new(
                require("AWS_REGION")?,
                require("AWS_ACCESS_KEY_ID")?,
                require("AWS_SECRET_ACCESS_KEY")?,
            );
            if let Some(token) = lookup("AWS_SESSION_TOKEN") {
                mailer = mailer.session_token(token);
            }
            Arc::new(mailer)
        }
        #[cfg(not(feature = "amazon_ses"))]
        "amazon_ses" => {
            return Err(DispatchError::Configuration(
                "EMAIL_PROVIDER=amazon_ses but 'amazon_ses' feature is not enabled. \
                Add `features = [\"amazon_ses\"]` to Cargo.toml"
                    .into(),
            ))
        }

        #[cfg(feature = "local")]
        "local" => Arc::new(providers::LocalMailer::new()),
        #[cfg(not(feature = "local"))]
        "local" => {
            return Err(DispatchError::Configuration(
                "EMAIL_PROVIDER=local but 'local' feature is not enabled. \
                Add `features = [\"local\"]` to Cargo.toml"
                    .into(),
            ))
        }

        "logger" => Arc::new(providers::LoggerMailer::new()),

        _ => {
            return Err(DispatchError::Configuration(format!(
                "Unknown EMAIL_PROVIDER: {}. Valid providers are: amazon_ses, local, logger",
                provider
            )))
        }
    };

    mailer.validate_config()?;
    tracing::debug!(provider = mailer.provider_name(), "Mail provider configured");
    Ok(mailer)
}
