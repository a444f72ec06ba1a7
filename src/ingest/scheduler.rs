// src/ingest/scheduler.rs
//! Cycle Scheduler: runs one pipeline cycle per tick, never two at once, and never
//! lets a failed (or panicking) cycle take the loop down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ingest::error::{CycleError, PublishError};
use crate::ingest::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Published { generation: u64, events: usize },
    /// Safety switch engaged; the previous snapshot stays current.
    Suppressed,
    /// Resolution failed; nothing was fetched.
    Skipped(String),
    Failed(String),
    Panicked(String),
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Published { .. } => "published",
            Self::Suppressed => "suppressed",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
            Self::Panicked(_) => "panicked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Completed(CycleOutcome),
    /// A cycle was already running; this trigger was dropped.
    AlreadyRunning,
}

/// Clears the running flag when the cycle scope ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CycleScheduler {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    running: AtomicBool,
    wake: Arc<Notify>,
}

impl CycleScheduler {
    pub fn new(pipeline: Arc<Pipeline>, interval: Duration) -> Self {
        Self {
            pipeline,
            interval,
            running: AtomicBool::new(false),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Handle for manual triggers. A trigger that arrives mid-cycle is remembered and
    /// runs right after the current cycle.
    pub fn trigger_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// Run one cycle now, unless one is already in progress.
    pub async fn run_once(&self) -> TriggerOutcome {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            tracing::debug!(target: "ingest", "cycle already running, trigger dropped");
            return TriggerOutcome::AlreadyRunning;
        };

        let pipeline = self.pipeline.clone();
        let joined = tokio::spawn(async move { pipeline.run_cycle().await }).await;

        let outcome = match joined {
            Ok(Ok(report)) => {
                tracing::info!(
                    target: "ingest",
                    generation = report.generation,
                    events = report.events,
                    windows_fetched = report.windows_fetched.len(),
                    windows_failed = report.windows_failed.len(),
                    rows_dropped = report.rows_dropped,
                    duplicates = report.duplicates_collapsed,
                    "cycle complete"
                );
                CycleOutcome::Published {
                    generation: report.generation,
                    events: report.events,
                }
            }
            Ok(Err(CycleError::Publish(PublishError::Empty(e)))) => {
                tracing::warn!(target: "ingest", error = %e, "cycle produced no events");
                CycleOutcome::Suppressed
            }
            Ok(Err(CycleError::Resolution(e))) => {
                tracing::warn!(target: "ingest", error = %e, "cycle skipped");
                CycleOutcome::Skipped(e.to_string())
            }
            Ok(Err(e)) => {
                tracing::error!(target: "ingest", error = %e, "cycle failed");
                CycleOutcome::Failed(e.to_string())
            }
            Err(e) => {
                tracing::error!(target: "ingest", error = %e, "cycle task aborted");
                CycleOutcome::Panicked(e.to_string())
            }
        };

        counter!("ingest_cycles_total", "outcome" => outcome.label()).increment(1);
        TriggerOutcome::Completed(outcome)
    }

    /// Drive cycles forever: first one immediately, then every `interval`, plus
    /// whenever the trigger handle is notified. Late ticks are skipped, not bunched.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = self.wake.notified() => {
                        tracing::info!(target: "ingest", "manual refresh");
                    }
                }
                self.run_once().await;
            }
        })
    }
}
