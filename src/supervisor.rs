//! The outer loop that keeps the watcher alive.
//!
//! Each iteration runs one [`Cycle`] behind a panic boundary and an optional
//! deadline, logs how it ended, then rests for a fixed interval. Nothing that
//! happens inside a cycle can end the loop; only the shutdown future can.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::cycle::{CycleOutcome, CycleReport};
use crate::error::WatchError;

/// Shortest rest the supervisor will take between cycles.
pub const MIN_REST_INTERVAL: Duration = Duration::from_secs(1);

/// A unit of work the supervisor can run repeatedly.
pub trait Cycle {
    async fn run(&mut self) -> Result<CycleReport, WatchError>;
}

/// Zero and negative values collapse to [`MIN_REST_INTERVAL`].
pub fn clamp_rest_interval(secs: i64) -> Duration {
    u64::try_from(secs)
        .map(Duration::from_secs)
        .unwrap_or(MIN_REST_INTERVAL)
        .max(MIN_REST_INTERVAL)
}

#[derive(Debug, Clone)]
pub struct Supervisor {
    rest_interval: Duration,
    cycle_timeout: Option<Duration>,
}

impl Supervisor {
    pub fn new(rest_interval_secs: i64, cycle_timeout: Option<Duration>) -> Self {
        let rest_interval = clamp_rest_interval(rest_interval_secs);
        if rest_interval.as_secs() as i64 != rest_interval_secs {
            tracing::warn!(
                configured = rest_interval_secs,
                effective = rest_interval.as_secs(),
                "Rest interval below floor, clamped",
            );
        }
        Self {
            rest_interval,
            cycle_timeout,
        }
    }

    pub fn rest_interval(&self) -> Duration {
        self.rest_interval
    }

    /// Run a single cycle in isolation and classify how it ended.
    pub async fn run_iteration<C: Cycle>(&self, cycle: &mut C, iteration: u64) -> CycleOutcome {
        let span = tracing::info_span!("cycle", id = %Uuid::new_v4(), iteration);
        async move {
            let started = Instant::now();
            tracing::debug!("Cycle started");

            let guarded = AssertUnwindSafe(cycle.run()).catch_unwind();
            let result = match self.cycle_timeout {
                Some(limit) => match tokio::time::timeout(limit, guarded).await {
                    Ok(result) => result,
                    Err(_) => {
                        let outcome = CycleOutcome::Crashed {
                            reason: format!("exceeded deadline of {}s", limit.as_secs()),
                        };
                        log_outcome(&outcome, None, started.elapsed());
                        return outcome;
                    }
                },
                None => guarded.await,
            };

            let (outcome, report) = match result {
                Ok(Ok(report)) => (report.outcome(), Some(report)),
                Ok(Err(e)) => (CycleOutcome::Crashed { reason: e.to_string() }, None),
                Err(payload) => (
                    CycleOutcome::Crashed {
                        reason: format!("panicked: {}", panic_message(payload.as_ref())),
                    },
                    None,
                ),
            };
            log_outcome(&outcome, report.as_ref(), started.elapsed());
            outcome
        }
        .instrument(span)
        .await
    }

    /// Loop forever until `shutdown` resolves.
    ///
    /// Shutdown is checked first on every poll, so it interrupts a running
    /// cycle as well as the rest that follows it.
    pub async fn run_until<C, F>(&self, cycle: &mut C, shutdown: F)
    where
        C: Cycle,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(rest_secs = self.rest_interval.as_secs(), "Supervisor started");

        let mut iteration: u64 = 0;
        loop {
            iteration += 1;
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.iterate_and_rest(cycle, iteration) => {}
            }
        }

        tracing::info!(iterations = iteration, "Supervisor stopped");
    }

    async fn iterate_and_rest<C: Cycle>(&self, cycle: &mut C, iteration: u64) {
        self.run_iteration(cycle, iteration).await;
        tracing::debug!(secs = self.rest_interval.as_secs(), "Resting");
        tokio::time::sleep(self.rest_interval).await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn log_outcome(outcome: &CycleOutcome, report: Option<&CycleReport>, elapsed: Duration) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match (outcome, report) {
        (CycleOutcome::Completed, Some(r)) => tracing::info!(
            outcome = outcome.label(),
            elapsed_ms,
            targets = r.targets_checked,
            seen = r.postings_seen,
            matched = r.postings_matched,
            changes = r.changes_detected,
            delivered = r.changes_delivered,
            "Cycle finished",
        ),
        (CycleOutcome::FailedRecoverably { failures }, r) => tracing::warn!(
            outcome = outcome.label(),
            elapsed_ms,
            targets = r.map_or(0, |r| r.targets_checked),
            failed_targets = r.map_or(0, |r| r.targets_failed),
            changes = r.map_or(0, |r| r.changes_detected),
            committed = r.is_some_and(|r| r.committed),
            failures = %failures.join("; "),
            "Cycle finished with failures",
        ),
        (CycleOutcome::Crashed { reason }, _) => tracing::error!(
            outcome = outcome.label(),
            elapsed_ms,
            reason = %reason,
            "Cycle crashed",
        ),
        (CycleOutcome::Completed, None) => {
            tracing::info!(outcome = outcome.label(), elapsed_ms, "Cycle finished")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::cycle::CycleFailure;
    use crate::error::ConfigError;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Ok,
        Fail,
        Err,
        Panic,
        Hang,
    }

    /// Plays back a fixed script, then keeps returning `Ok`.
    #[derive(Default)]
    struct ScriptedCycle {
        script: VecDeque<Step>,
        starts: Vec<Instant>,
    }

    impl ScriptedCycle {
        fn new(steps: &[Step]) -> Self {
            Self {
                script: steps.iter().copied().collect(),
                starts: Vec::new(),
            }
        }
    }

    impl Cycle for ScriptedCycle {
        async fn run(&mut self) -> Result<CycleReport, WatchError> {
            self.starts.push(Instant::now());
            match self.script.pop_front().unwrap_or(Step::Ok) {
                Step::Ok => Ok(CycleReport::default()),
                Step::Fail => Ok(CycleReport {
                    targets_failed: 1,
                    failures: vec![CycleFailure {
                        scope: "lever:acme".into(),
                        message: "timed out".into(),
                    }],
                    ..CycleReport::default()
                }),
                Step::Err => Err(WatchError::Config(ConfigError::NoTargets)),
                Step::Panic => panic!("scripted panic"),
                Step::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    #[test]
    fn interval_is_clamped_to_floor() {
        assert_eq!(clamp_rest_interval(600), Duration::from_secs(600));
        assert_eq!(clamp_rest_interval(0), MIN_REST_INTERVAL);
        assert_eq!(clamp_rest_interval(-30), MIN_REST_INTERVAL);
        assert_eq!(Supervisor::new(-1, None).rest_interval(), MIN_REST_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_starts_are_spaced_by_rest_interval() {
        let supervisor = Supervisor::new(600, None);
        let mut cycle = ScriptedCycle::default();

        supervisor
            .run_until(&mut cycle, tokio::time::sleep(Duration::from_secs(1801)))
            .await;

        assert_eq!(cycle.starts.len(), 4);
        for pair in cycle.starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(600));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_does_not_hot_loop() {
        let supervisor = Supervisor::new(0, None);
        let mut cycle = ScriptedCycle::default();

        supervisor
            .run_until(&mut cycle, tokio::time::sleep(Duration::from_millis(3500)))
            .await;

        assert_eq!(cycle.starts.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn faults_never_stop_the_loop() {
        let steps = [Step::Ok, Step::Err, Step::Panic, Step::Fail, Step::Panic, Step::Err];
        let supervisor = Supervisor::new(10, None);
        let mut cycle = ScriptedCycle::new(&steps);

        supervisor
            .run_until(&mut cycle, tokio::time::sleep(Duration::from_secs(75)))
            .await;

        // Every scripted step ran, and the loop went on past them.
        assert!(cycle.script.is_empty());
        assert!(cycle.starts.len() > steps.len());
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_are_classified() {
        let supervisor = Supervisor::new(1, None);
        let mut cycle = ScriptedCycle::new(&[Step::Ok, Step::Fail, Step::Err, Step::Panic]);

        assert_eq!(supervisor.run_iteration(&mut cycle, 1).await, CycleOutcome::Completed);

        match supervisor.run_iteration(&mut cycle, 2).await {
            CycleOutcome::FailedRecoverably { failures } => {
                assert_eq!(failures, vec!["lever:acme: timed out".to_string()]);
            }
            other => panic!("expected FailedRecoverably, got {other:?}"),
        }

        match supervisor.run_iteration(&mut cycle, 3).await {
            CycleOutcome::Crashed { reason } => assert!(reason.contains("no watch targets")),
            other => panic!("expected Crashed, got {other:?}"),
        }

        match supervisor.run_iteration(&mut cycle, 4).await {
            CycleOutcome::Crashed { reason } => assert_eq!(reason, "panicked: scripted panic"),
            other => panic!("expected Crashed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_cycle_is_cut_off_by_deadline() {
        let supervisor = Supervisor::new(60, Some(Duration::from_secs(5)));
        let mut cycle = ScriptedCycle::new(&[Step::Hang]);

        let started = Instant::now();
        let outcome = supervisor.run_iteration(&mut cycle, 1).await;

        assert_eq!(
            outcome,
            CycleOutcome::Crashed {
                reason: "exceeded deadline of 5s".into()
            }
        );
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_a_hung_cycle() {
        let supervisor = Supervisor::new(60, None);
        let mut cycle = ScriptedCycle::new(&[Step::Hang]);

        supervisor
            .run_until(&mut cycle, tokio::time::sleep(Duration::from_secs(30)))
            .await;

        assert_eq!(cycle.starts.len(), 1);
    }
}
