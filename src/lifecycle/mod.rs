//! Task state machine service.
//!
//! Wraps the pure rules in `rules` with repository I/O: read the task,
//! apply the action, bump the optimistic version, save with the expected
//! version. A losing concurrent writer gets `CoreError::Conflict` and is
//! expected to re-read and retry; the failed attempt persists nothing.

pub mod rules;

use std::sync::Arc;

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::events::TaskEvent;
use crate::model::Task;
use crate::ports::{Clock, TaskRepository};

pub use rules::{TaskAction, SYSTEM_ACTOR};

/// Outcome of a successful transition: the saved task plus any lifecycle
/// events for the caller to dispatch.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub task: Task,
    pub events: Vec<TaskEvent>,
}

pub struct TaskLifecycle {
    tasks: Arc<dyn TaskRepository>,
    clock: Arc<dyn Clock>,
}

impl TaskLifecycle {
    pub fn new(tasks: Arc<dyn TaskRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { tasks, clock }
    }

    /// Persist a freshly built task (user action or recurrence engine).
    pub async fn create(&self, task: Task) -> CoreResult<Task> {
        self.tasks.insert(&task).await?;
        debug!(task_id = %task.id, status = %task.status, "task created");
        Ok(task)
    }

    /// All instances generated from one recurring template.
    pub async fn instances_of(&self, template_id: &str) -> CoreResult<Vec<Task>> {
        self.tasks.list_by_recurring_template(template_id).await
    }

    /// Apply one action to the stored task. Exactly one history entry is
    /// appended per successful transition.
    pub async fn transition(&self, task_id: &str, action: TaskAction) -> CoreResult<TransitionOutcome> {
        let task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("task", task_id))?;

        let expected = task.version;
        let now = self.clock.now();
        let (mut task, event) = rules::apply(task, &action, now)?;
        task.version = expected + 1;
        self.tasks.save(&task, expected).await?;

        debug!(
            task_id = %task.id,
            action = action.name(),
            status = %task.status,
            "task transition"
        );

        Ok(TransitionOutcome {
            task,
            events: event.into_iter().collect(),
        })
    }

    // Convenience wrappers — one per state-machine action.

    pub async fn start(&self, task_id: &str, by: &str) -> CoreResult<TransitionOutcome> {
        self.transition(task_id, TaskAction::Start { by: by.to_string() })
            .await
    }

    pub async fn submit(&self, task_id: &str, by: &str, note: &str) -> CoreResult<TransitionOutcome> {
        self.transition(
            task_id,
            TaskAction::Submit {
                by: by.to_string(),
                note: note.to_string(),
            },
        )
        .await
    }

    pub async fn review(&self, task_id: &str, by: &str) -> CoreResult<TransitionOutcome> {
        self.transition(task_id, TaskAction::Review { by: by.to_string() })
            .await
    }

    pub async fn approve(&self, task_id: &str, by: &str) -> CoreResult<TransitionOutcome> {
        self.transition(task_id, TaskAction::Approve { by: by.to_string() })
            .await
    }

    pub async fn reject(
        &self,
        task_id: &str,
        by: &str,
        reason: Option<String>,
    ) -> CoreResult<TransitionOutcome> {
        self.transition(
            task_id,
            TaskAction::Reject {
                by: by.to_string(),
                reason,
            },
        )
        .await
    }

    pub async fn reopen(
        &self,
        task_id: &str,
        by: &str,
        note: Option<String>,
    ) -> CoreResult<TransitionOutcome> {
        self.transition(
            task_id,
            TaskAction::Reopen {
                by: by.to_string(),
                note,
            },
        )
        .await
    }

    pub async fn cancel(
        &self,
        task_id: &str,
        by: &str,
        reason: Option<String>,
    ) -> CoreResult<TransitionOutcome> {
        self.transition(
            task_id,
            TaskAction::Cancel {
                by: by.to_string(),
                reason,
            },
        )
        .await
    }

    pub async fn mark_overdue(&self, task_id: &str) -> CoreResult<TransitionOutcome> {
        self.transition(task_id, TaskAction::MarkOverdue).await
    }
}
