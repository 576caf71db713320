use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of a posting across cycles: `<source>::<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    pub fn new(source: &str, id: &str) -> Self {
        Self(format!("{source}::{id}"))
    }

    /// Accept a stored `<source>::<id>` key. Rejects blanks, whitespace and
    /// JSON punctuation.
    pub fn parse(raw: &str) -> Option<Self> {
        let (source, id) = raw.split_once("::")?;
        let valid = !source.is_empty()
            && !id.is_empty()
            && !raw
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '"' | '{' | '}' | '[' | ']'));
        valid.then(|| Self(raw.to_string()))
    }

    /// The `board:slug` part of the key.
    pub fn source(&self) -> &str {
        self.0.split_once("::").map_or(&self.0, |(source, _)| source)
    }

    /// The board-assigned posting id.
    pub fn id(&self) -> &str {
        self.0.split_once("::").map_or("", |(_, id)| id)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observed state of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Present in the board listing.
    Open,
    /// Seen before, absent from a successful listing of its board.
    Closed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Open => write!(f, "open"),
            JobState::Closed => write!(f, "closed"),
        }
    }
}

/// A single job posting as reported by a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    /// Watch target that produced it, e.g. `greenhouse:stripe`.
    pub source: String,
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub url: String,
}

impl JobPosting {
    pub fn key(&self) -> JobKey {
        JobKey::new(&self.source, &self.id)
    }
}

/// A detected transition, handed to every reaction sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub key: JobKey,
    pub posting: JobPosting,
    pub old: Option<JobState>,
    pub new: JobState,
}

impl StateChange {
    /// New or reopened posting.
    pub fn is_opening(&self) -> bool {
        self.new == JobState::Open
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.old {
            Some(old) => write!(f, "{}: {old} -> {}", self.key, self.new),
            None => write!(f, "{}: (unseen) -> {}", self.key, self.new),
        }
    }
}

#[cfg(test)]
pub(crate) fn posting(source: &str, id: &str, title: &str) -> JobPosting {
    JobPosting {
        source: source.to_string(),
        id: id.to_string(),
        title: title.to_string(),
        company: source.split_once(':').map_or(source, |(_, c)| c).to_string(),
        location: "Remote".to_string(),
        description: String::new(),
        url: format!("https://jobs.example.com/{id}"),
    }
}
