//! Reaction sinks: what happens when a job's observed state changes.
//!
//! Every sink receives the whole batch of changes detected in one cycle.
//! Sinks are independent: the cycle delivers to each one even if another
//! failed, and only commits the batch once all of them succeeded.

pub mod email;
pub mod log;
pub mod webhook;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::WatchConfig;
use crate::error::WatchError;
use crate::ui::ConsoleReport;
use crate::watch::StateChange;

pub use email::{EmailDigest, EmailError, SmtpSettings};
pub use log::LogSink;
pub use webhook::WebhookSink;

#[derive(Debug, Error)]
pub enum ReactionError {
    #[error("email delivery failed: {0}")]
    Email(#[from] EmailError),

    #[error("webhook returned status {status}: {body}")]
    WebhookStatus { status: u16, body: String },

    #[error("webhook request failed: {0}")]
    WebhookHttp(#[from] reqwest::Error),
}

#[async_trait]
pub trait ReactionSink: Send + Sync {
    /// Label used in logs and cycle reports.
    fn name(&self) -> &str;

    async fn deliver(&self, changes: &[StateChange]) -> Result<(), ReactionError>;
}

/// Build the sinks configured for this cycle.
///
/// In dry-run mode nothing is notified: the only sink is the console report.
pub fn build_sinks(
    config: &WatchConfig,
    dry_run: bool,
) -> Result<Vec<Box<dyn ReactionSink>>, WatchError> {
    if dry_run {
        return Ok(vec![Box::new(ConsoleReport::new())]);
    }

    let mut sinks: Vec<Box<dyn ReactionSink>> = vec![Box::new(LogSink)];

    if config.email.enabled {
        let smtp = SmtpSettings::from_env()?;
        sinks.push(Box::new(EmailDigest::new(smtp, config.email.clone())));
    }

    if let Some(webhook) = &config.webhook {
        sinks.push(Box::new(WebhookSink::new(webhook, &config.http)?));
    }

    Ok(sinks)
}
