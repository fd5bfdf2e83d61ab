//! Overdue sweep.
//!
//! Each tick lists open tasks whose due time has passed. Tasks not yet
//! marked overdue go through the state machine (emitting the lifecycle
//! event and a single group notification); tasks already overdue are
//! re-observed so the late penalty can fire once the 48h window elapses —
//! the scoring dedupe key keeps repeated observations single-shot.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::events::TaskEvent;
use crate::kpi::KpiScoringEngine;
use crate::lifecycle::TaskLifecycle;
use crate::model::TaskStatus;
use crate::ports::{Clock, NotificationSink, TaskRepository};

pub struct OverdueSweep {
    tasks: Arc<dyn TaskRepository>,
    lifecycle: Arc<TaskLifecycle>,
    kpi: Arc<KpiScoringEngine>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
}

impl OverdueSweep {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        lifecycle: Arc<TaskLifecycle>,
        kpi: Arc<KpiScoringEngine>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            tasks,
            lifecycle,
            kpi,
            clock,
            notifier,
        }
    }

    /// Returns the number of tasks newly marked overdue.
    pub async fn run(&self) -> CoreResult<usize> {
        let now = self.clock.now();
        let due = self.tasks.list_due_for_overdue_check(now).await?;
        let mut marked = 0;

        for task in due {
            if task.status == TaskStatus::Overdue {
                // Already overdue — re-observe for the late penalty only.
                let Some(due_time) = task.due_time else { continue };
                let event = TaskEvent::became_overdue(&task, due_time, now);
                if let Err(e) = self.kpi.on_event(&event).await {
                    warn!(task_id = %task.id, err = %e, "overdue re-observation scoring failed");
                }
                continue;
            }

            match self.lifecycle.mark_overdue(&task.id).await {
                Ok(outcome) => {
                    marked += 1;
                    for event in &outcome.events {
                        if let Err(e) = self.kpi.on_event(event).await {
                            warn!(task_id = %task.id, err = %e, "overdue scoring failed");
                        }
                    }
                    self.notifier
                        .notify(
                            &outcome.task.group_id,
                            &format!("Task \"{}\" is overdue", outcome.task.title),
                        )
                        .await;
                }
                // Someone transitioned the task mid-sweep — drop it, the
                // next tick re-evaluates from fresh state.
                Err(CoreError::Conflict { .. }) | Err(CoreError::InvalidTransition { .. }) => {
                    debug!(task_id = %task.id, "task changed under the overdue sweep — skipped");
                }
                Err(e) => {
                    warn!(task_id = %task.id, err = %e, "overdue transition failed");
                }
            }
        }

        Ok(marked)
    }
}
