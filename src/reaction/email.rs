//! E-mail digest delivery via SMTP.
//!
//! [`EmailDigest`] wraps the `lettre` async SMTP transport and sends one
//! plain-text message per cycle listing every change. Credentials come from
//! the environment (a `.env` file is loaded at startup); presentation comes
//! from the `[email]` table of the config file.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{ReactionError, ReactionSink};
use crate::config::EmailSettings;
use crate::error::ConfigError;
use crate::watch::{JobState, StateChange};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// SmtpSettings
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Port that speaks implicit TLS instead of STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub mail_from: String,
    pub mail_to: String,
}

impl SmtpSettings {
    /// Load SMTP settings from the process environment.
    ///
    /// | Variable    | Required | Default        |
    /// |-------------|----------|----------------|
    /// | `SMTP_HOST` | yes      | --             |
    /// | `SMTP_PORT` | no       | `587`          |
    /// | `SMTP_USER` | no       | --             |
    /// | `SMTP_PASS` | no       | --             |
    /// | `MAIL_FROM` | no       | `SMTP_USER`    |
    /// | `MAIL_TO`   | no       | `MAIL_FROM`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = get("SMTP_HOST").ok_or(ConfigError::MissingEnv("SMTP_HOST"))?;
        let port = match get("SMTP_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "SMTP_PORT",
                value: raw,
            })?,
            None => DEFAULT_SMTP_PORT,
        };
        let user = get("SMTP_USER");
        let password = get("SMTP_PASS");
        let mail_from = get("MAIL_FROM")
            .or_else(|| user.clone())
            .ok_or(ConfigError::MissingEnv("MAIL_FROM"))?;
        let mail_to = get("MAIL_TO").unwrap_or_else(|| mail_from.clone());

        Ok(Self {
            host,
            port,
            user,
            password,
            mail_from,
            mail_to,
        })
    }
}

// ---------------------------------------------------------------------------
// EmailDigest
// ---------------------------------------------------------------------------

pub struct EmailDigest {
    smtp: SmtpSettings,
    settings: EmailSettings,
}

impl EmailDigest {
    pub fn new(smtp: SmtpSettings, settings: EmailSettings) -> Self {
        Self { smtp, settings }
    }

    pub fn subject(&self, changes: &[StateChange]) -> String {
        format!(
            "{} {} matching role(s)",
            self.settings.subject_prefix,
            changes.len()
        )
    }

    pub fn body(changes: &[StateChange]) -> String {
        changes
            .iter()
            .map(|c| {
                let p = &c.posting;
                let marker = match c.new {
                    JobState::Open if c.old == Some(JobState::Closed) => "[reopened] ",
                    JobState::Open => "",
                    JobState::Closed => "[closed] ",
                };
                format!(
                    "{marker}{} - {}\n{}\nSource: {}\n",
                    p.title,
                    p.location.trim(),
                    p.url,
                    p.source
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Send a canned message to check the SMTP setup.
    pub async fn send_test(&self) -> Result<(), EmailError> {
        self.send(
            "[TEST] Job Watcher SMTP OK".to_string(),
            "Test email from Job Watcher: SMTP is configured correctly.".to_string(),
        )
        .await
    }

    async fn send(&self, subject: String, body: String) -> Result<(), EmailError> {
        let from = Mailbox::new(
            Some(self.settings.from_name.clone()),
            self.smtp.mail_from.parse()?,
        );
        let to: Mailbox = self.smtp.mail_to.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let relay = if self.smtp.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp.host)?
        };
        let mut transport_builder = relay.port(self.smtp.port).timeout(Some(SMTP_TIMEOUT));

        if let (Some(user), Some(pass)) = (&self.smtp.user, &self.smtp.password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let mailer = transport_builder.build();
        mailer.send(email).await?;

        tracing::info!(to = %self.smtp.mail_to, "Digest email sent");
        Ok(())
    }
}

#[async_trait]
impl ReactionSink for EmailDigest {
    fn name(&self) -> &str {
        "email"
    }

    async fn deliver(&self, changes: &[StateChange]) -> Result<(), ReactionError> {
        if changes.is_empty() {
            return Ok(());
        }
        self.send(self.subject(changes), Self::body(changes)).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::watch::JobPosting;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn change(title: &str, old: Option<JobState>, new: JobState) -> StateChange {
        let posting = JobPosting {
            source: "greenhouse:stripe".into(),
            id: title.to_lowercase(),
            title: title.into(),
            company: "stripe".into(),
            location: " Remote ".into(),
            description: String::new(),
            url: format!("https://example.com/{}", title.to_lowercase()),
        };
        StateChange {
            key: posting.key(),
            posting,
            old,
            new,
        }
    }

    #[test]
    fn settings_require_host() {
        let err = SmtpSettings::from_lookup(lookup(&[("SMTP_USER", "me@example.com")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("SMTP_HOST")));
    }

    #[test]
    fn settings_fall_back_through_user_and_from() {
        let smtp = SmtpSettings::from_lookup(lookup(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USER", "me@example.com"),
            ("SMTP_PASS", "secret"),
        ]))
        .unwrap();
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.mail_from, "me@example.com");
        assert_eq!(smtp.mail_to, "me@example.com");
    }

    #[test]
    fn settings_reject_bad_port() {
        let err = SmtpSettings::from_lookup(lookup(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_PORT", "smtp"),
            ("MAIL_FROM", "me@example.com"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { name: "SMTP_PORT", .. }));
    }

    #[test]
    fn settings_require_a_sender() {
        let err = SmtpSettings::from_lookup(lookup(&[("SMTP_HOST", "smtp.example.com")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("MAIL_FROM")));
    }

    #[test]
    fn subject_counts_changes() {
        let smtp = SmtpSettings::from_lookup(lookup(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("MAIL_FROM", "me@example.com"),
        ]))
        .unwrap();
        let digest = EmailDigest::new(smtp, EmailSettings::default());
        let changes = vec![
            change("Backend", None, JobState::Open),
            change("Frontend", None, JobState::Open),
        ];
        assert_eq!(digest.subject(&changes), "[NEW JOB] 2 matching role(s)");
    }

    #[test]
    fn body_lists_each_change() {
        let body = EmailDigest::body(&[
            change("Backend", None, JobState::Open),
            change("Infra", Some(JobState::Closed), JobState::Open),
            change("Legacy", Some(JobState::Open), JobState::Closed),
        ]);
        assert!(body.starts_with("Backend - Remote\nhttps://example.com/backend\nSource: greenhouse:stripe\n"));
        assert!(body.contains("[reopened] Infra - Remote"));
        assert!(body.contains("[closed] Legacy - Remote"));
    }

    #[test]
    fn email_error_display_address() {
        let addr_err: Result<lettre::Address, _> = "not-an-email".parse();
        let err = EmailError::Address(addr_err.unwrap_err());
        assert!(err.to_string().contains("Email address parse error"));
    }
}
