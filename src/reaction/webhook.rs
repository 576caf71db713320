use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;

use super::{ReactionError, ReactionSink};
use crate::config::{HttpConfig, WebhookConfig};
use crate::watch::{JobState, StateChange};

/// One record of the JSON array POSTed to the webhook.
#[derive(Debug, Serialize)]
struct WebhookRecord<'a> {
    job_id: &'a str,
    job_title: &'a str,
    company: &'a str,
    location: &'a str,
    description: &'a str,
    apply_link: &'a str,
    source: &'a str,
    previous_state: Option<JobState>,
    state: JobState,
    observed_at: DateTime<Utc>,
    origin: &'a str,
}

/// Forwards changes to an ingestion endpoint as a JSON array.
pub struct WebhookSink {
    client: Client,
    url: String,
    source_label: String,
}

impl WebhookSink {
    pub fn new(config: &WebhookConfig, http: &HttpConfig) -> Result<Self, ReactionError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
            .timeout(Duration::from_secs(http.request_timeout_secs))
            .user_agent(http.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            source_label: config.source_label.clone(),
        })
    }
}

#[async_trait]
impl ReactionSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, changes: &[StateChange]) -> Result<(), ReactionError> {
        if changes.is_empty() {
            return Ok(());
        }

        let observed_at = Utc::now();
        let records: Vec<WebhookRecord<'_>> = changes
            .iter()
            .map(|c| WebhookRecord {
                job_id: &c.posting.id,
                job_title: &c.posting.title,
                company: &c.posting.company,
                location: &c.posting.location,
                description: &c.posting.description,
                apply_link: &c.posting.url,
                source: &c.posting.source,
                previous_state: c.old,
                state: c.new,
                observed_at,
                origin: &self.source_label,
            })
            .collect();

        let response = self.client.post(&self.url).json(&records).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReactionError::WebhookStatus {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(url = %self.url, records = records.len(), "Webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::JobPosting;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink(url: String) -> WebhookSink {
        let config = WebhookConfig {
            url,
            source_label: "test-watcher".into(),
        };
        WebhookSink::new(&config, &HttpConfig::default()).unwrap()
    }

    fn opened(id: &str) -> StateChange {
        let posting = JobPosting {
            source: "lever:netflix".into(),
            id: id.into(),
            title: "SRE".into(),
            company: "netflix".into(),
            location: "Remote".into(),
            description: "on-call".into(),
            url: format!("https://jobs.lever.co/netflix/{id}"),
        };
        StateChange {
            key: posting.key(),
            posting,
            old: None,
            new: JobState::Open,
        }
    }

    #[tokio::test]
    async fn posts_json_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/applications"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let sink = sink(format!("{}/api/applications", server.uri()));
        sink.deliver(&[opened("a"), opened("b")]).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["job_id"], "a");
        assert_eq!(records[0]["state"], "open");
        assert_eq!(records[0]["previous_state"], serde_json::Value::Null);
        assert_eq!(records[1]["origin"], "test-watcher");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
            .mount(&server)
            .await;

        let sink = sink(server.uri());
        let err = sink.deliver(&[opened("a")]).await.unwrap_err();
        assert!(matches!(err, ReactionError::WebhookStatus { status: 500, ref body } if body == "db down"));
    }

    #[tokio::test]
    async fn empty_batch_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        sink(server.uri()).deliver(&[]).await.unwrap();
    }
}
