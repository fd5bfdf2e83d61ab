//! Lifecycle events emitted by task transitions.
//!
//! Transitions return events instead of publishing to a process-global bus;
//! the composition root (`CoreContext`) routes them to the KPI engine and
//! the notification sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::Task;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A task reached `completed`. Carries everything the scoring engine
    /// needs so it never has to re-read the task.
    Completed {
        task_id: String,
        group_id: String,
        creator_id: String,
        assignees: BTreeSet<String>,
        due_time: Option<DateTime<Utc>>,
        completed_at: DateTime<Utc>,
    },
    /// A tick observed an open task past its due time. Re-emitted on later
    /// ticks while the task stays open; scoring dedupe keeps the penalty
    /// single-shot.
    BecameOverdue {
        task_id: String,
        group_id: String,
        assignees: BTreeSet<String>,
        due_time: DateTime<Utc>,
        observed_at: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn completed(task: &Task, completed_at: DateTime<Utc>) -> Self {
        TaskEvent::Completed {
            task_id: task.id.clone(),
            group_id: task.group_id.clone(),
            creator_id: task.created_by.clone(),
            assignees: task.assignees.clone(),
            due_time: task.due_time,
            completed_at,
        }
    }

    pub fn became_overdue(task: &Task, due_time: DateTime<Utc>, observed_at: DateTime<Utc>) -> Self {
        TaskEvent::BecameOverdue {
            task_id: task.id.clone(),
            group_id: task.group_id.clone(),
            assignees: task.assignees.clone(),
            due_time,
            observed_at,
        }
    }
}
