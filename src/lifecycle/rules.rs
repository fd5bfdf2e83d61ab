//! Pure task transition rules.
//!
//! `apply` is the heart of the state machine: deterministic, no I/O, no
//! clock reads. It consumes the task, validates the requested edge, and
//! returns the updated task plus any lifecycle event. An invalid edge
//! returns `InvalidTransition` and the caller's persisted state stays
//! untouched — nothing is saved on the error path.

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::events::TaskEvent;
use crate::model::{
    new_correlation_id, ApprovalStatus, HistoryEntry, ReviewStatus, Task, TaskStatus,
};

/// Actor recorded for transitions the scheduler performs on its own.
pub const SYSTEM_ACTOR: &str = "scheduler";

/// All actions the state machine accepts.
#[derive(Debug, Clone)]
pub enum TaskAction {
    /// Any assignee activity moves the task into progress.
    Start { by: String },
    /// Submission payload is required; it lands in the history note.
    Submit { by: String, note: String },
    /// Reviewer decision. Only legal when a reviewer is configured.
    Review { by: String },
    /// Creator (or delegated approver) decision. Completes the task in the
    /// same transition: one history entry, two timestamps.
    Approve { by: String },
    Reject { by: String, reason: Option<String> },
    /// The only backward edge: rejected → in_progress, always with a
    /// history entry noting the reopen.
    Reopen { by: String, note: Option<String> },
    Cancel { by: String, reason: Option<String> },
    /// Scheduler-observed due-time breach. Overdue is a qualifier, not a
    /// trap — submit/approve proceed normally from it.
    MarkOverdue,
}

impl TaskAction {
    pub fn name(&self) -> &'static str {
        match self {
            TaskAction::Start { .. } => "start",
            TaskAction::Submit { .. } => "submit",
            TaskAction::Review { .. } => "review",
            TaskAction::Approve { .. } => "approve",
            TaskAction::Reject { .. } => "reject",
            TaskAction::Reopen { .. } => "reopen",
            TaskAction::Cancel { .. } => "cancel",
            TaskAction::MarkOverdue => "overdue",
        }
    }

    fn actor(&self) -> &str {
        match self {
            TaskAction::Start { by }
            | TaskAction::Submit { by, .. }
            | TaskAction::Review { by }
            | TaskAction::Approve { by }
            | TaskAction::Reject { by, .. }
            | TaskAction::Reopen { by, .. }
            | TaskAction::Cancel { by, .. } => by,
            TaskAction::MarkOverdue => SYSTEM_ACTOR,
        }
    }

    fn note(&self) -> Option<String> {
        match self {
            TaskAction::Submit { note, .. } => Some(note.clone()),
            TaskAction::Reject { reason, .. } | TaskAction::Cancel { reason, .. } => reason.clone(),
            TaskAction::Reopen { note, .. } => Some(
                note.clone()
                    .unwrap_or_else(|| "reopened after rejection".to_string()),
            ),
            _ => None,
        }
    }
}

fn invalid(task: &Task, action: &TaskAction) -> CoreError {
    CoreError::InvalidTransition {
        from: task.status.as_str().to_string(),
        requested: action.name().to_string(),
    }
}

/// Apply one action to a task. Returns the updated task and the lifecycle
/// event it emitted, if any.
pub fn apply(
    mut task: Task,
    action: &TaskAction,
    now: DateTime<Utc>,
) -> CoreResult<(Task, Option<TaskEvent>)> {
    let mut event = None;

    match action {
        TaskAction::Start { .. } => match task.status {
            TaskStatus::New | TaskStatus::Scheduled | TaskStatus::Overdue => {
                task.status = TaskStatus::InProgress;
            }
            _ => return Err(invalid(&task, action)),
        },

        TaskAction::Submit { note, .. } => {
            if note.trim().is_empty() {
                return Err(CoreError::Validation(
                    "submission payload must not be empty".to_string(),
                ));
            }
            match task.status {
                TaskStatus::InProgress | TaskStatus::Overdue => {
                    task.status = TaskStatus::Submitted;
                    task.submitted_at = Some(now);
                }
                _ => return Err(invalid(&task, action)),
            }
        }

        TaskAction::Review { .. } => {
            if task.reviewer.is_none() {
                return Err(CoreError::Validation(
                    "task has no reviewer configured — review passes through automatically"
                        .to_string(),
                ));
            }
            match task.status {
                TaskStatus::Submitted => {
                    task.status = TaskStatus::Reviewed;
                    task.workflow.review = ReviewStatus::Approved;
                    task.reviewed_at = Some(now);
                }
                _ => return Err(invalid(&task, action)),
            }
        }

        TaskAction::Approve { .. } => {
            let legal = match task.status {
                TaskStatus::Reviewed => true,
                // Absent reviewer: review step passes through automatically.
                TaskStatus::Submitted if task.reviewer.is_none() => {
                    task.workflow.review = ReviewStatus::Skipped;
                    true
                }
                _ => false,
            };
            if !legal {
                return Err(invalid(&task, action));
            }
            task.workflow.approval = ApprovalStatus::Approved;
            task.status = TaskStatus::Completed;
            task.approved_at = Some(now);
            task.completed_at = Some(now);
            event = Some(TaskEvent::completed(&task, now));
        }

        TaskAction::Reject { .. } => match task.status {
            TaskStatus::Submitted => {
                task.workflow.review = ReviewStatus::Rejected;
                task.status = TaskStatus::Rejected;
            }
            TaskStatus::Reviewed => {
                task.workflow.approval = ApprovalStatus::Rejected;
                task.status = TaskStatus::Rejected;
            }
            _ => return Err(invalid(&task, action)),
        },

        TaskAction::Reopen { .. } => match task.status {
            TaskStatus::Rejected => {
                task.status = TaskStatus::InProgress;
                task.workflow.review = ReviewStatus::Pending;
                task.workflow.approval = ApprovalStatus::Pending;
            }
            _ => return Err(invalid(&task, action)),
        },

        TaskAction::Cancel { .. } => {
            if task.status.is_terminal() {
                return Err(invalid(&task, action));
            }
            task.status = TaskStatus::Cancelled;
        }

        TaskAction::MarkOverdue => {
            let due = task.due_time.ok_or_else(|| {
                CoreError::Validation("task has no due time to be overdue against".to_string())
            })?;
            match task.status {
                TaskStatus::New | TaskStatus::Scheduled | TaskStatus::InProgress => {
                    task.status = TaskStatus::Overdue;
                    event = Some(TaskEvent::became_overdue(&task, due, now));
                }
                _ => return Err(invalid(&task, action)),
            }
        }
    }

    task.workflow.history.push(HistoryEntry {
        action: action.name().to_string(),
        by_id: action.actor().to_string(),
        at: now,
        note: action.note(),
        correlation_id: new_correlation_id(),
    });
    task.updated_at = now;

    Ok((task, event))
}
