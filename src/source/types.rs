//! Wire types for the public board APIs and their mapping to [`JobPosting`].
//!
//! Every field is optional: boards omit fields freely, and a posting
//! without an id is dropped rather than failing the whole listing.

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::WatchTarget;
use crate::watch::JobPosting;

// Greenhouse sends numeric ids, Lever and Ashby strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn non_empty(values: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    values
        .into_iter()
        .flatten()
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Greenhouse: GET /v1/boards/{slug}/jobs?content=true
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GreenhouseResponse {
    #[serde(default)]
    pub jobs: Vec<GreenhouseJob>,
}

#[derive(Debug, Deserialize)]
pub struct GreenhouseJob {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub title: Option<String>,
    pub location: Option<GreenhouseLocation>,
    pub content: Option<String>,
    pub absolute_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GreenhouseLocation {
    pub name: Option<String>,
}

impl GreenhouseJob {
    pub fn into_posting(self, target: &WatchTarget) -> Option<JobPosting> {
        Some(JobPosting {
            source: target.to_string(),
            id: self.id?,
            title: self.title.unwrap_or_default().trim().to_string(),
            company: target.slug.clone(),
            location: self.location.and_then(|l| l.name).unwrap_or_default(),
            description: self.content.unwrap_or_default(),
            url: self.absolute_url.unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Lever: GET /v0/postings/{slug}?mode=json
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeverPosting {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub text: Option<String>,
    pub categories: Option<LeverCategories>,
    pub description_plain: Option<String>,
    pub description: Option<String>,
    pub hosted_url: Option<String>,
    pub apply_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LeverCategories {
    pub location: Option<String>,
}

impl LeverPosting {
    pub fn into_posting(self, target: &WatchTarget) -> Option<JobPosting> {
        let id = non_empty([self.id, self.hosted_url.clone(), self.apply_url.clone()])?;
        Some(JobPosting {
            source: target.to_string(),
            id,
            title: self.text.unwrap_or_default().trim().to_string(),
            company: target.slug.clone(),
            location: self.categories.and_then(|c| c.location).unwrap_or_default(),
            description: non_empty([self.description_plain, self.description]).unwrap_or_default(),
            url: non_empty([self.hosted_url, self.apply_url]).unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Ashby: POST /api/non-user-graphql (FindJobs)
// ---------------------------------------------------------------------------

const ASHBY_FIND_JOBS: &str = "query FindJobs($organizationSlug: String!, $page: Int) {
  jobPostings(organizationSlug: $organizationSlug, page: $page, statuses: [PUBLISHED]) {
    totalCount
    jobPostings { id title locationSlug locationName absoluteUrl descriptionText }
  }
}";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AshbyRequest {
    pub operation_name: &'static str,
    pub variables: AshbyVariables,
    pub query: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AshbyVariables {
    pub organization_slug: String,
    pub page: u32,
}

impl AshbyRequest {
    pub fn find_jobs(organization_slug: &str) -> Self {
        Self {
            operation_name: "FindJobs",
            variables: AshbyVariables {
                organization_slug: organization_slug.to_string(),
                page: 1,
            },
            query: ASHBY_FIND_JOBS,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AshbyResponse {
    pub data: Option<AshbyData>,
    #[serde(default)]
    pub errors: Vec<AshbyGraphqlError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AshbyData {
    pub job_postings: Option<AshbyPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AshbyPage {
    #[serde(default)]
    pub job_postings: Vec<AshbyPosting>,
}

#[derive(Debug, Deserialize)]
pub struct AshbyGraphqlError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AshbyPosting {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub title: Option<String>,
    pub location_slug: Option<String>,
    pub location_name: Option<String>,
    pub absolute_url: Option<String>,
    pub description_text: Option<String>,
}

impl AshbyResponse {
    pub fn into_postings(self) -> Vec<AshbyPosting> {
        self.data
            .and_then(|d| d.job_postings)
            .map(|p| p.job_postings)
            .unwrap_or_default()
    }
}

impl AshbyPosting {
    pub fn into_posting(self, target: &WatchTarget) -> Option<JobPosting> {
        Some(JobPosting {
            source: target.to_string(),
            id: self.id?,
            title: self.title.unwrap_or_default().trim().to_string(),
            company: target.slug.clone(),
            location: non_empty([self.location_name, self.location_slug]).unwrap_or_default(),
            description: self.description_text.unwrap_or_default(),
            url: self.absolute_url.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoardKind;

    #[test]
    fn greenhouse_numeric_id_and_nested_location() {
        let json = r#"{"jobs": [
            {"id": 4012345, "title": " Backend Engineer ", "location": {"name": "Remote"},
             "content": "&lt;p&gt;Rust&lt;/p&gt;", "absolute_url": "https://boards.greenhouse.io/stripe/jobs/4012345"},
            {"title": "No id, dropped"}
        ]}"#;
        let target = WatchTarget::new(BoardKind::Greenhouse, "stripe");
        let resp: GreenhouseResponse = serde_json::from_str(json).unwrap();
        let postings: Vec<JobPosting> = resp
            .jobs
            .into_iter()
            .filter_map(|j| j.into_posting(&target))
            .collect();

        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].id, "4012345");
        assert_eq!(postings[0].title, "Backend Engineer");
        assert_eq!(postings[0].location, "Remote");
        assert_eq!(postings[0].source, "greenhouse:stripe");
    }

    #[test]
    fn lever_falls_back_to_hosted_url_for_id() {
        let json = r#"[
            {"text": "SRE", "hostedUrl": "https://jobs.lever.co/netflix/abc",
             "categories": {"location": "Los Gatos, CA"}, "description": "<b>html</b>"}
        ]"#;
        let target = WatchTarget::new(BoardKind::Lever, "netflix");
        let postings: Vec<LeverPosting> = serde_json::from_str(json).unwrap();
        let posting = postings
            .into_iter()
            .next()
            .unwrap()
            .into_posting(&target)
            .unwrap();

        assert_eq!(posting.id, "https://jobs.lever.co/netflix/abc");
        assert_eq!(posting.url, "https://jobs.lever.co/netflix/abc");
        assert_eq!(posting.location, "Los Gatos, CA");
        assert_eq!(posting.description, "<b>html</b>");
    }

    #[test]
    fn ashby_request_shape() {
        let body = serde_json::to_value(AshbyRequest::find_jobs("ramp")).unwrap();
        assert_eq!(body["operationName"], "FindJobs");
        assert_eq!(body["variables"]["organizationSlug"], "ramp");
        assert_eq!(body["variables"]["page"], 1);
    }

    #[test]
    fn ashby_nested_postings_with_location_fallback() {
        let json = r#"{"data": {"jobPostings": {"totalCount": 1, "jobPostings": [
            {"id": "a1", "title": "Data Engineer", "locationSlug": "nyc", "absoluteUrl": "https://jobs.ashbyhq.com/ramp/a1"}
        ]}}}"#;
        let target = WatchTarget::new(BoardKind::Ashby, "ramp");
        let resp: AshbyResponse = serde_json::from_str(json).unwrap();
        let posting = resp
            .into_postings()
            .into_iter()
            .next()
            .unwrap()
            .into_posting(&target)
            .unwrap();
        assert_eq!(posting.location, "nyc");
        assert_eq!(posting.company, "ramp");
    }

    #[test]
    fn ashby_missing_data_is_empty() {
        let resp: AshbyResponse = serde_json::from_str(r#"{"data": null}"#).unwrap();
        assert!(resp.into_postings().is_empty());
    }
}
