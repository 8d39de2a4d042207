//! Poll driver: runs the coordinator on a fixed interval and on demand.
//!
//! The first tick fires immediately at start. Shutdown stops new cycles; a
//! cycle already running finishes first.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use crate::engine::{Coordinator, CycleOutcome};

pub struct PollDriver {
    coordinator: Arc<Coordinator>,
    interval: Duration,
    shutdown: Notify,
    stopped: AtomicBool,
}

impl PollDriver {
    pub fn new(coordinator: Arc<Coordinator>, interval_secs: u64) -> Self {
        Self {
            coordinator,
            interval: Duration::from_secs(interval_secs.max(1)),
            shutdown: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Run one cycle now. Used by the admin write path after persisting.
    pub async fn trigger(&self) -> CycleOutcome {
        if self.stopped.load(Ordering::SeqCst) {
            return CycleOutcome::Stopped;
        }
        self.coordinator.evaluate_and_dispatch(Utc::now()).await
    }

    /// Stop ticking and refuse further triggers.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // notify_one keeps a permit if the loop is not waiting right now.
        self.shutdown.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Tick loop. Returns after [`PollDriver::shutdown`].
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            "⏰ Broadcast scheduler started (check every {}s)",
            self.interval.as_secs()
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.notified() => break,
            }
            if self.is_stopped() {
                break;
            }
            match self.coordinator.evaluate_and_dispatch(Utc::now()).await {
                CycleOutcome::Completed(report) if !report.stages.is_empty() => {
                    tracing::info!("✅ Cycle v{} sent {} stage(s)", report.version, report.stages.len());
                }
                CycleOutcome::Aborted { reason } => {
                    tracing::warn!("⚠️ Cycle aborted: {reason}");
                }
                _ => {}
            }
        }
        tracing::info!("🛑 Broadcast scheduler stopped");
    }

    /// Spawn [`PollDriver::run`] on the runtime.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.clone().run())
    }
}
