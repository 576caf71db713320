use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use super::JobSource;
use super::error::SourceError;
use super::types::{AshbyRequest, AshbyResponse, GreenhouseResponse, LeverPosting};
use crate::config::{BoardKind, HttpConfig, SourcesConfig, WatchTarget};
use crate::watch::JobPosting;

// Longest error body kept in a `SourceError::Status` message.
const MAX_ERROR_BODY: usize = 300;

/// Queries the public Greenhouse, Lever and Ashby board APIs over HTTP.
///
/// Built at the start of a cycle and dropped at its end, so pooled
/// connections never outlive the cycle that opened them.
pub struct HttpJobSource {
    client: Client,
    endpoints: SourcesConfig,
}

impl HttpJobSource {
    pub fn new(http: &HttpConfig, endpoints: SourcesConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
            .timeout(Duration::from_secs(http.request_timeout_secs))
            .user_agent(http.user_agent.clone())
            .build()
            .map_err(SourceError::Client)?;
        Ok(Self { client, endpoints })
    }

    fn url(base: &str, path: &str) -> String {
        format!("{}{path}", base.trim_end_matches('/'))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        target: &WatchTarget,
        request: RequestBuilder,
    ) -> Result<T, SourceError> {
        let response = request
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(target, e))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0);
            return Err(SourceError::RateLimited {
                target: target.to_string(),
                retry_after_secs,
            });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound {
                target: target.to_string(),
            });
        }

        if !status.is_success() {
            let mut message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            if message.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| message.is_char_boundary(*i))
                    .unwrap_or(0);
                message.truncate(cut);
            }
            return Err(SourceError::Status {
                target: target.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::from_reqwest(target, e))?;
        serde_json::from_slice(&bytes).map_err(|e| SourceError::Parse {
            target: target.to_string(),
            message: e.to_string(),
        })
    }

    async fn fetch_greenhouse(&self, target: &WatchTarget) -> Result<Vec<JobPosting>, SourceError> {
        let url = Self::url(
            &self.endpoints.greenhouse_base_url,
            &format!("/v1/boards/{}/jobs", target.slug),
        );
        let request = self.client.get(url).query(&[("content", "true")]);
        let body: GreenhouseResponse = self.send_json(target, request).await?;
        Ok(body
            .jobs
            .into_iter()
            .filter_map(|j| j.into_posting(target))
            .collect())
    }

    async fn fetch_lever(&self, target: &WatchTarget) -> Result<Vec<JobPosting>, SourceError> {
        let url = Self::url(
            &self.endpoints.lever_base_url,
            &format!("/v0/postings/{}", target.slug),
        );
        let request = self.client.get(url).query(&[("mode", "json")]);
        let body: Vec<LeverPosting> = self.send_json(target, request).await?;
        Ok(body
            .into_iter()
            .filter_map(|p| p.into_posting(target))
            .collect())
    }

    async fn fetch_ashby(&self, target: &WatchTarget) -> Result<Vec<JobPosting>, SourceError> {
        let url = Self::url(&self.endpoints.ashby_base_url, "/api/non-user-graphql");
        let request = self
            .client
            .post(url)
            .json(&AshbyRequest::find_jobs(&target.slug));
        let body: AshbyResponse = self.send_json(target, request).await?;

        if body.data.is_none() && !body.errors.is_empty() {
            let message = body
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SourceError::Parse {
                target: target.to_string(),
                message: format!("GraphQL error: {message}"),
            });
        }

        Ok(body
            .into_postings()
            .into_iter()
            .filter_map(|p| p.into_posting(target))
            .collect())
    }
}

impl JobSource for HttpJobSource {
    async fn fetch(&self, target: &WatchTarget) -> Result<Vec<JobPosting>, SourceError> {
        match target.kind {
            BoardKind::Greenhouse => self.fetch_greenhouse(target).await,
            BoardKind::Lever => self.fetch_lever(target).await,
            BoardKind::Ashby => self.fetch_ashby(target).await,
        }
    }
}
