//! One poll-and-react pass over every watch target.
//!
//! [`run_cycle`] is the pure part: query, filter, diff, react, commit.
//! [`Watcher`] wraps it with the per-cycle setup (config reload, HTTP client,
//! sinks) and state persistence, and is what the supervisor drives.

use std::fmt;
use std::path::PathBuf;

use chrono::Utc;
use futures::future::join_all;

use crate::config::WatchConfig;
use crate::error::WatchError;
use crate::filter::JobFilter;
use crate::reaction::{ReactionSink, build_sinks};
use crate::source::{HttpJobSource, JobSource};
use crate::supervisor::Cycle;
use crate::watch::{Snapshot, StateChange, StateStore, detect_changes};

/// How a cycle ended. Only ever inspected for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    FailedRecoverably { failures: Vec<String> },
    Crashed { reason: String },
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Completed => "completed",
            CycleOutcome::FailedRecoverably { .. } => "failed_recoverably",
            CycleOutcome::Crashed { .. } => "crashed",
        }
    }
}

/// Whether reactions really fire and the store is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    Live,
    DryRun,
}

/// A target or sink that failed in this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleFailure {
    pub scope: String,
    pub message: String,
}

impl fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.message)
    }
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub targets_checked: usize,
    pub targets_failed: usize,
    pub postings_seen: usize,
    pub postings_matched: usize,
    pub changes_detected: usize,
    pub changes_delivered: usize,
    pub committed: bool,
    pub failures: Vec<CycleFailure>,
}

impl CycleReport {
    pub fn outcome(&self) -> CycleOutcome {
        if self.failures.is_empty() {
            CycleOutcome::Completed
        } else {
            CycleOutcome::FailedRecoverably {
                failures: self.failures.iter().map(ToString::to_string).collect(),
            }
        }
    }
}

/// Run one pass against an already-loaded configuration.
///
/// Targets are queried concurrently but their results are kept apart, so a
/// failing board is skipped without affecting the others. Detected changes
/// are committed to `store` only if every sink accepted them; otherwise they
/// will be detected again next cycle.
pub async fn run_cycle<S: JobSource>(
    config: &WatchConfig,
    filter: &JobFilter,
    source: &S,
    sinks: &[Box<dyn ReactionSink>],
    store: &mut StateStore,
    mode: CycleMode,
) -> CycleReport {
    let mut report = CycleReport::default();
    let targets = config.targets();

    let results = join_all(targets.iter().map(|target| async move {
        (target, source.fetch(target).await)
    }))
    .await;

    let mut snapshot = Snapshot::new();
    for (target, result) in results {
        match result {
            Ok(postings) => {
                report.targets_checked += 1;
                report.postings_seen += postings.len();
                let matched =
                    snapshot.record_target(&target.to_string(), postings, |p| filter.passes(p));
                report.postings_matched += matched;
                tracing::debug!(target = %target, matched, "Fetched board");
            }
            Err(e) => {
                report.targets_failed += 1;
                tracing::warn!(
                    target = %target,
                    kind = e.kind(),
                    transient = e.is_transient(),
                    error = %e,
                    "Skipping target this cycle",
                );
                report.failures.push(CycleFailure {
                    scope: target.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    if snapshot.is_empty() && report.targets_checked > 0 {
        tracing::debug!("No posting passed the filters");
    }
    let changes = detect_changes(&snapshot, store);
    tracing::debug!(postings = snapshot.len(), changes = changes.len(), "Snapshot compared");
    report.changes_detected = changes.len();

    let mut reacted: Vec<&StateChange> = changes
        .iter()
        .filter(|c| c.is_opening() || config.notify_closed)
        .collect();
    reacted.sort_by(|a, b| {
        let score_a = filter.location_score(&a.posting.location);
        let score_b = filter.location_score(&b.posting.location);
        score_b
            .cmp(&score_a)
            .then_with(|| a.posting.title.to_lowercase().cmp(&b.posting.title.to_lowercase()))
    });
    let reacted: Vec<StateChange> = reacted.into_iter().cloned().collect();

    let mut all_delivered = true;
    for sink in sinks {
        if let Err(e) = sink.deliver(&reacted).await {
            all_delivered = false;
            tracing::warn!(sink = sink.name(), error = %e, "Reaction failed");
            report.failures.push(CycleFailure {
                scope: format!("sink:{}", sink.name()),
                message: e.to_string(),
            });
        }
    }

    if mode == CycleMode::Live {
        let now = Utc::now();
        if all_delivered {
            for change in &changes {
                tracing::debug!(change = %change, "Committing");
                store.apply(change, now);
            }
            report.committed = true;
            report.changes_delivered = reacted.len();
        }
        for posting in snapshot.postings() {
            store.touch(&posting.key(), now);
        }
        if let Some(max_age) = config.prune_closed_after() {
            let pruned = store.prune_closed(now - max_age);
            if pruned > 0 {
                tracing::debug!(pruned, "Pruned old closed records");
            }
        }
    }

    report
}

/// The real watch cycle: reloads configuration every run and persists the
/// state store it owns.
pub struct Watcher {
    config_path: PathBuf,
    store: StateStore,
    mode: CycleMode,
}

impl Watcher {
    pub fn new(config_path: PathBuf, store: StateStore, mode: CycleMode) -> Self {
        Self {
            config_path,
            store,
            mode,
        }
    }

    pub async fn run_once(&mut self) -> Result<CycleReport, WatchError> {
        let config = WatchConfig::load(&self.config_path)?;
        let filter = JobFilter::from_config(&config)?;
        let source = HttpJobSource::new(&config.http, config.sources.clone())?;
        let sinks = build_sinks(&config, self.mode == CycleMode::DryRun)?;

        let report = run_cycle(&config, &filter, &source, &sinks, &mut self.store, self.mode).await;

        if self.store.is_dirty() {
            self.store.save()?;
        }
        Ok(report)
    }
}

impl Cycle for Watcher {
    async fn run(&mut self) -> Result<CycleReport, WatchError> {
        self.run_once().await
    }
}
