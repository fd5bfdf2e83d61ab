//! Scheduler: the single periodic ticker driving recurrence evaluation
//! and overdue detection.
//!
//! The ticker is injectable so tests can simulate many ticks instantly;
//! production uses a plain tokio interval. A tick that fails logs and
//! retries on the next cycle — cursor discipline in the recurrence engine
//! and the transactional quorum execution keep failed ticks side-effect
//! free.

pub mod overdue;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::kpi::KpiScoringEngine;
use crate::lifecycle::TaskLifecycle;
use crate::ports::{Clock, NotificationSink, TaskRepository};
use crate::recurrence::RecurrenceEngine;
use overdue::OverdueSweep;

// ─── Ticker ──────────────────────────────────────────────────────────────────

/// Injectable tick source.
#[async_trait]
pub trait Ticker: Send {
    /// Completes when the next tick is due.
    async fn wait(&mut self);
}

/// Production ticker over `tokio::time::interval`.
pub struct IntervalTicker {
    interval: tokio::time::Interval,
}

impl IntervalTicker {
    pub fn every(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        // Ticks that pile up during a slow sweep collapse into one.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn wait(&mut self) {
        self.interval.tick().await;
    }
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

/// Outcome of one tick, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub instances_generated: usize,
    pub marked_overdue: usize,
}

pub struct Scheduler {
    recurrence: Arc<RecurrenceEngine>,
    sweep: OverdueSweep,
}

impl Scheduler {
    pub fn new(
        recurrence: Arc<RecurrenceEngine>,
        tasks: Arc<dyn TaskRepository>,
        lifecycle: Arc<TaskLifecycle>,
        kpi: Arc<KpiScoringEngine>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            sweep: OverdueSweep::new(tasks, lifecycle, kpi, clock, notifier),
            recurrence,
        }
    }

    /// One full evaluation cycle: recurrence first, then the overdue
    /// sweep. Each half logs its own failure and leaves no partial
    /// cursor/state behind; the next tick retries cleanly.
    pub async fn tick_once(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        match self.recurrence.tick().await {
            Ok(n) => summary.instances_generated = n,
            Err(e) => warn!(err = %e, "recurrence tick failed — retrying next cycle"),
        }

        match self.sweep.run().await {
            Ok(n) => summary.marked_overdue = n,
            Err(e) => warn!(err = %e, "overdue sweep failed — retrying next cycle"),
        }

        summary
    }

    /// Run forever on the given ticker. This is the only long-running
    /// background loop in the daemon.
    pub async fn run(&self, mut ticker: impl Ticker) {
        info!("scheduler started");
        loop {
            ticker.wait().await;
            let summary = self.tick_once().await;
            if summary != TickSummary::default() {
                info!(
                    generated = summary.instances_generated,
                    overdue = summary.marked_overdue,
                    "scheduler tick"
                );
            }
        }
    }
}
