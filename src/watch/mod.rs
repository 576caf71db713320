mod diff;
mod posting;
mod store;

pub use diff::{Snapshot, detect_changes};
pub use posting::{JobKey, JobPosting, JobState, StateChange};
pub use store::StateStore;
