//! Error types for job-board queries.
//!
//! [`SourceError`] keeps the failure modes apart (timeout, not found, rate
//! limiting, other HTTP statuses, network and decoding faults) so the watch
//! cycle can log a precise reason for every target it had to skip.

use thiserror::Error;

use crate::config::WatchTarget;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The request did not complete within the configured timeout.
    #[error("request to {target} timed out")]
    Timeout { target: String },

    /// The board slug does not exist (HTTP 404).
    #[error("board {target} not found")]
    NotFound { target: String },

    /// HTTP 429. `retry_after_secs` comes from the `Retry-After` header when present.
    #[error("rate limited by {target}, retry after {retry_after_secs}s")]
    RateLimited {
        target: String,
        retry_after_secs: u64,
    },

    /// Any other non-success status.
    #[error("{target} returned status {status}: {message}")]
    Status {
        target: String,
        status: u16,
        message: String,
    },

    /// Connection-level failure (DNS, refused, reset).
    #[error("network error for {target}: {source}")]
    Network {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    /// The body was not the JSON shape the board documents.
    #[error("failed to parse response from {target}: {message}")]
    Parse { target: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl SourceError {
    pub(crate) fn from_reqwest(target: &WatchTarget, err: reqwest::Error) -> Self {
        let target = target.to_string();
        if err.is_timeout() {
            SourceError::Timeout { target }
        } else if err.is_decode() {
            SourceError::Parse {
                target,
                message: err.to_string(),
            }
        } else {
            SourceError::Network {
                target,
                source: err,
            }
        }
    }

    /// Whether the next cycle has a reasonable chance of succeeding unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Timeout { .. }
            | SourceError::RateLimited { .. }
            | SourceError::Network { .. } => true,
            SourceError::Status { status, .. } => *status >= 500,
            SourceError::NotFound { .. } | SourceError::Parse { .. } | SourceError::Client(_) => {
                false
            }
        }
    }

    /// Short machine-friendly label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Timeout { .. } => "timeout",
            SourceError::NotFound { .. } => "not_found",
            SourceError::RateLimited { .. } => "rate_limited",
            SourceError::Status { .. } => "status",
            SourceError::Network { .. } => "network",
            SourceError::Parse { .. } => "parse",
            SourceError::Client(_) => "client",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display() {
        let err = SourceError::RateLimited {
            target: "lever:netflix".into(),
            retry_after_secs: 30,
        };
        assert_eq!(err.to_string(), "rate limited by lever:netflix, retry after 30s");
        assert!(err.is_transient());
        assert_eq!(err.kind(), "rate_limited");
    }

    #[test]
    fn status_transience_follows_status_class() {
        let server = SourceError::Status {
            target: "greenhouse:stripe".into(),
            status: 503,
            message: "unavailable".into(),
        };
        let client = SourceError::Status {
            target: "greenhouse:stripe".into(),
            status: 403,
            message: "forbidden".into(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
    }

    #[test]
    fn not_found_is_permanent() {
        let err = SourceError::NotFound {
            target: "ashby:nope".into(),
        };
        assert_eq!(err.to_string(), "board ashby:nope not found");
        assert!(!err.is_transient());
    }
}
