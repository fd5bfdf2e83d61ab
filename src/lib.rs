pub mod config;
pub mod error;
pub mod events;
pub mod kpi;
pub mod lifecycle;
pub mod model;
pub mod ports;
pub mod quorum;
pub mod recurrence;
pub mod scheduler;
pub mod storage;

use std::sync::Arc;

use chrono::Duration;
use tracing::warn;

use config::HiveConfig;
use error::CoreResult;
use events::TaskEvent;
use kpi::KpiScoringEngine;
use lifecycle::TaskLifecycle;
use model::KpiRecord;
use ports::{
    Clock, DeletionRequestRepository, KpiRepository, MemberRoster, NotificationSink,
    TaskRepository, TemplateRepository,
};
use quorum::DeletionQuorumCoordinator;
use recurrence::RecurrenceEngine;
use scheduler::Scheduler;
use storage::Storage;

/// Shared application state: the repositories and engines, wired once and
/// cloned into the scheduler and any embedding presentation layer.
#[derive(Clone)]
pub struct CoreContext {
    pub config: Arc<HiveConfig>,
    pub tasks: Arc<dyn TaskRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub deletion_requests: Arc<dyn DeletionRequestRepository>,
    pub kpi_repo: Arc<dyn KpiRepository>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn NotificationSink>,
    pub lifecycle: Arc<TaskLifecycle>,
    pub recurrence: Arc<RecurrenceEngine>,
    pub kpi: Arc<KpiScoringEngine>,
}

impl CoreContext {
    /// Wire the engines over sqlite-backed repositories. Clock and
    /// notification sink stay injectable so tests drive time and capture
    /// messages.
    pub fn new(
        config: Arc<HiveConfig>,
        storage: &Storage,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let tasks: Arc<dyn TaskRepository> = Arc::new(storage.tasks());
        let templates: Arc<dyn TemplateRepository> = Arc::new(storage.templates());
        let deletion_requests: Arc<dyn DeletionRequestRepository> =
            Arc::new(storage.deletion_requests());
        let kpi_repo: Arc<dyn KpiRepository> = Arc::new(storage.kpi());

        let lifecycle = Arc::new(TaskLifecycle::new(tasks.clone(), clock.clone()));
        let recurrence = Arc::new(RecurrenceEngine::new(
            templates.clone(),
            lifecycle.clone(),
            clock.clone(),
            notifier.clone(),
        ));
        let kpi = Arc::new(KpiScoringEngine::new(
            kpi_repo.clone(),
            config.scoring.clone(),
        ));

        Self {
            config,
            tasks,
            templates,
            deletion_requests,
            kpi_repo,
            clock,
            notifier,
            lifecycle,
            recurrence,
            kpi,
        }
    }

    /// The quorum coordinator needs a member roster, which belongs to the
    /// chat-platform layer — callers hand theirs in.
    pub fn quorum(&self, roster: Arc<dyn MemberRoster>) -> DeletionQuorumCoordinator {
        DeletionQuorumCoordinator::new(
            self.deletion_requests.clone(),
            roster,
            self.clock.clone(),
            self.notifier.clone(),
            Duration::hours(self.config.deletion.request_ttl_hours),
        )
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.recurrence.clone(),
            self.tasks.clone(),
            self.lifecycle.clone(),
            self.kpi.clone(),
            self.clock.clone(),
            self.notifier.clone(),
        )
    }

    /// Route lifecycle events to the scoring engine. Scoring failures are
    /// logged, never bubbled into the transition that emitted the event.
    pub async fn dispatch(&self, events: &[TaskEvent]) -> Vec<KpiRecord> {
        let mut written = Vec::new();
        for event in events {
            match self.kpi.on_event(event).await {
                Ok(mut records) => written.append(&mut records),
                Err(e) => warn!(err = %e, "kpi scoring failed for lifecycle event"),
            }
        }
        written
    }

    /// Convenience wrapper: apply a transition and score its events.
    pub async fn transition(
        &self,
        task_id: &str,
        action: lifecycle::TaskAction,
    ) -> CoreResult<lifecycle::TransitionOutcome> {
        let outcome = self.lifecycle.transition(task_id, action).await?;
        self.dispatch(&outcome.events).await;
        Ok(outcome)
    }
}
