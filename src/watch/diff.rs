use std::collections::{BTreeMap, BTreeSet};

use super::posting::{JobKey, JobPosting, JobState, StateChange};
use super::store::StateStore;

/// Postings observed during one cycle, grouped by the targets that answered.
///
/// Only successfully fetched targets are recorded, so a board that failed
/// this cycle never makes its postings look closed. `listed` holds every
/// key a board returned; `postings` only the ones that passed the filter.
#[derive(Debug, Default)]
pub struct Snapshot {
    fetched: BTreeSet<String>,
    listed: BTreeSet<JobKey>,
    postings: BTreeMap<JobKey, JobPosting>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a target's full listing, keeping the postings `keep` accepts.
    /// Duplicate ids within a listing collapse. Returns how many were kept.
    pub fn record_target(
        &mut self,
        source: &str,
        postings: impl IntoIterator<Item = JobPosting>,
        keep: impl Fn(&JobPosting) -> bool,
    ) -> usize {
        self.fetched.insert(source.to_string());
        let mut kept = 0;
        for posting in postings {
            let key = posting.key();
            self.listed.insert(key.clone());
            if keep(&posting) {
                self.postings.insert(key, posting);
                kept += 1;
            }
        }
        kept
    }

    pub fn was_fetched(&self, source: &str) -> bool {
        self.fetched.contains(source)
    }

    /// Whether the board listed this key, filtered or not.
    pub fn is_listed(&self, key: &JobKey) -> bool {
        self.listed.contains(key)
    }

    pub fn postings(&self) -> impl Iterator<Item = &JobPosting> {
        self.postings.values()
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}

/// Compare a snapshot with the last known states, in key order.
///
/// - unseen or previously closed posting -> `Open`
/// - open posting missing from its (fetched) board's listing -> `Closed`
/// - a listed posting that no longer passes the filter keeps its state
/// - anything else is unchanged and yields nothing
pub fn detect_changes(snapshot: &Snapshot, store: &StateStore) -> Vec<StateChange> {
    let mut changes: Vec<StateChange> = snapshot
        .postings
        .iter()
        .filter_map(|(key, posting)| {
            let old = store.get(key).map(|r| r.state);
            (old != Some(JobState::Open)).then(|| StateChange {
                key: key.clone(),
                posting: posting.clone(),
                old,
                new: JobState::Open,
            })
        })
        .collect();

    let closed = store
        .records()
        .filter(|(key, record)| {
            record.state == JobState::Open
                && snapshot.was_fetched(key.source())
                && !snapshot.is_listed(key)
        })
        .map(|(key, record)| StateChange {
            key: key.clone(),
            posting: record.to_posting(key),
            old: Some(JobState::Open),
            new: JobState::Closed,
        });
    changes.extend(closed);
    changes.sort_by(|a, b| a.key.cmp(&b.key));
    changes
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::watch::posting::posting;

    fn seed(store: &mut StateStore, p: &JobPosting, state: JobState) {
        let change = StateChange {
            key: p.key(),
            posting: p.clone(),
            old: None,
            new: state,
        };
        store.apply(&change, Utc::now());
    }

    #[test]
    fn everything_is_new_on_an_empty_store() {
        let mut snapshot = Snapshot::new();
        snapshot.record_target(
            "greenhouse:stripe",
            vec![posting("greenhouse:stripe", "1", "A"), posting("greenhouse:stripe", "2", "B")],
            |_| true,
        );

        let changes = detect_changes(&snapshot, &StateStore::in_memory());
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.old.is_none() && c.new == JobState::Open));
    }

    #[test]
    fn unchanged_snapshot_yields_nothing() {
        let a = posting("greenhouse:stripe", "1", "A");
        let mut store = StateStore::in_memory();
        seed(&mut store, &a, JobState::Open);

        let mut snapshot = Snapshot::new();
        snapshot.record_target("greenhouse:stripe", vec![a], |_| true);
        assert!(detect_changes(&snapshot, &store).is_empty());
    }

    #[test]
    fn only_the_new_job_changes() {
        let a = posting("greenhouse:stripe", "A", "Job A");
        let b = posting("greenhouse:stripe", "B", "Job B");
        let mut store = StateStore::in_memory();
        seed(&mut store, &a, JobState::Open);

        let mut snapshot = Snapshot::new();
        snapshot.record_target("greenhouse:stripe", vec![a, b.clone()], |_| true);
        let changes = detect_changes(&snapshot, &store);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, b.key());
        assert_eq!(changes[0].old, None);
    }

    #[test]
    fn missing_posting_closes_only_when_board_was_fetched() {
        let gone = posting("lever:netflix", "old", "Gone");
        let mut store = StateStore::in_memory();
        seed(&mut store, &gone, JobState::Open);

        let snapshot = Snapshot::new();
        assert!(detect_changes(&snapshot, &store).is_empty());

        let mut snapshot = Snapshot::new();
        snapshot.record_target("lever:netflix", Vec::new(), |_| true);
        let changes = detect_changes(&snapshot, &store);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old, Some(JobState::Open));
        assert_eq!(changes[0].new, JobState::Closed);
        assert_eq!(changes[0].posting.title, "Gone");
    }

    #[test]
    fn closed_posting_that_reappears_reopens() {
        let back = posting("ashby:ramp", "r1", "Back again");
        let mut store = StateStore::in_memory();
        seed(&mut store, &back, JobState::Closed);

        let mut snapshot = Snapshot::new();
        snapshot.record_target("ashby:ramp", vec![back], |_| true);
        let changes = detect_changes(&snapshot, &store);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old, Some(JobState::Closed));
        assert_eq!(changes[0].new, JobState::Open);
    }

    #[test]
    fn duplicate_ids_collapse() {
        let mut snapshot = Snapshot::new();
        snapshot.record_target(
            "greenhouse:stripe",
            vec![posting("greenhouse:stripe", "1", "A"), posting("greenhouse:stripe", "1", "A")],
            |_| true,
        );
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn filtered_but_listed_posting_is_not_closed() {
        let kept = posting("greenhouse:stripe", "1", "Senior Engineer");
        let mut store = StateStore::in_memory();
        seed(&mut store, &kept, JobState::Open);

        let mut snapshot = Snapshot::new();
        let matched = snapshot.record_target("greenhouse:stripe", vec![kept.clone()], |_| false);

        assert_eq!(matched, 0);
        assert!(snapshot.is_empty());
        assert!(snapshot.is_listed(&kept.key()));
        assert!(detect_changes(&snapshot, &store).is_empty());
    }
}
