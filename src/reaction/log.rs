use async_trait::async_trait;

use super::{ReactionError, ReactionSink};
use crate::watch::StateChange;

/// Emits one structured log line per change. Always installed in live mode.
pub struct LogSink;

#[async_trait]
impl ReactionSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, changes: &[StateChange]) -> Result<(), ReactionError> {
        for change in changes {
            tracing::info!(
                key = %change.key,
                title = %change.posting.title,
                location = %change.posting.location,
                url = %change.posting.url,
                old = ?change.old,
                new = %change.new,
                "Job state changed",
            );
        }
        Ok(())
    }
}
