pub mod client;
pub mod error;
pub mod types;

pub use client::HttpJobSource;
pub use error::SourceError;

use crate::config::WatchTarget;
use crate::watch::JobPosting;

/// Anything that can list the current postings of a watch target.
pub trait JobSource {
    async fn fetch(&self, target: &WatchTarget) -> Result<Vec<JobPosting>, SourceError>;
}
