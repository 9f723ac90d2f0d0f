//! Periodic update scheduling.
//!
//! [`UpdateScheduler`] runs the orchestrator on a fixed interval and on
//! demand. Runs execute on tokio's blocking pool; at most one is in flight
//! and ticks arriving meanwhile are skipped, not queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestrator::{UpdateOrchestrator, UpdateOutcome};

/// Callback invoked with the outcome of every completed run.
pub type OutcomeHandler = Arc<dyn Fn(&UpdateOutcome) + Send + Sync>;

/// Counters returned when the scheduler stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Runs that completed.
    pub runs: u64,
    /// Ticks or triggers dropped because a run was in flight.
    pub skipped: u64,
}

/// Requests an immediate run from a running scheduler.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<()>,
}

impl TriggerHandle {
    /// Request a run. Returns `false` if one is already pending or the
    /// scheduler has stopped.
    pub fn trigger(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// Runs the orchestrator periodically until shut down.
pub struct UpdateScheduler {
    orchestrator: Arc<UpdateOrchestrator>,
    interval: Duration,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: mpsc::Receiver<()>,
    on_outcome: Option<OutcomeHandler>,
}

impl UpdateScheduler {
    pub fn new(orchestrator: Arc<UpdateOrchestrator>, interval: Duration) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        Self {
            orchestrator,
            interval,
            trigger_tx,
            trigger_rx,
            on_outcome: None,
        }
    }

    /// Call `handler` after each completed run.
    pub fn with_outcome_handler(mut self, handler: OutcomeHandler) -> Self {
        self.on_outcome = Some(handler);
        self
    }

    /// Handle for requesting immediate runs.
    pub fn trigger_handle(&self) -> TriggerHandle {
        TriggerHandle {
            tx: self.trigger_tx.clone(),
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// The first run starts immediately. Cancelling `shutdown` also cancels
    /// an in-flight run between download chunks; the scheduler waits for it
    /// to return before stopping.
    pub async fn run(mut self, shutdown: CancellationToken) -> SchedulerStats {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stats = SchedulerStats::default();
        let mut in_flight: Option<JoinHandle<Option<UpdateOutcome>>> = None;

        info!(interval_secs = self.interval.as_secs(), "Update scheduler started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                joined = join_in_flight(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    self.finish_run(joined, &mut stats);
                }

                _ = ticker.tick() => {
                    self.start_run("tick", &mut in_flight, &shutdown, &mut stats);
                }

                Some(()) = self.trigger_rx.recv() => {
                    self.start_run("trigger", &mut in_flight, &shutdown, &mut stats);
                }
            }
        }

        if let Some(handle) = in_flight.take() {
            debug!("Waiting for in-flight run to stop");
            let joined = handle.await;
            self.finish_run(joined, &mut stats);
        }

        info!(runs = stats.runs, skipped = stats.skipped, "Update scheduler stopped");
        stats
    }

    fn start_run(
        &self,
        cause: &'static str,
        in_flight: &mut Option<JoinHandle<Option<UpdateOutcome>>>,
        shutdown: &CancellationToken,
        stats: &mut SchedulerStats,
    ) {
        if in_flight.is_some() {
            stats.skipped += 1;
            debug!(cause, "Run in progress, skipping");
            return;
        }

        debug!(cause, "Starting scheduled run");
        let orchestrator = Arc::clone(&self.orchestrator);
        let cancel = shutdown.child_token();
        *in_flight = Some(tokio::task::spawn_blocking(move || {
            orchestrator.try_run(&cancel)
        }));
    }

    fn finish_run(
        &self,
        joined: Result<Option<UpdateOutcome>, JoinError>,
        stats: &mut SchedulerStats,
    ) {
        match joined {
            Ok(Some(outcome)) => {
                stats.runs += 1;
                if let Some(handler) = &self.on_outcome {
                    handler(&outcome);
                }
            }
            Ok(None) => {
                stats.skipped += 1;
                debug!("Orchestrator busy, run skipped");
            }
            Err(e) => warn!(error = %e, "Update run panicked"),
        }
    }
}

async fn join_in_flight(
    in_flight: &mut Option<JoinHandle<Option<UpdateOutcome>>>,
) -> Result<Option<UpdateOutcome>, JoinError> {
    match in_flight.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
