//! Task model: top-level status, review/approval sub-workflow, and the
//! append-only action history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The finite set of states a task can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    New,
    Scheduled,
    InProgress,
    Submitted,
    Reviewed,
    Approved,
    Completed,
    Rejected,
    Cancelled,
    Overdue,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::New => "new",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Submitted => "submitted",
            TaskStatus::Reviewed => "reviewed",
            TaskStatus::Approved => "approved",
            TaskStatus::Completed => "completed",
            TaskStatus::Rejected => "rejected",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Overdue => "overdue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "new" => TaskStatus::New,
            "scheduled" => TaskStatus::Scheduled,
            "in_progress" => TaskStatus::InProgress,
            "submitted" => TaskStatus::Submitted,
            "reviewed" => TaskStatus::Reviewed,
            "approved" => TaskStatus::Approved,
            "completed" => TaskStatus::Completed,
            "rejected" => TaskStatus::Rejected,
            "cancelled" => TaskStatus::Cancelled,
            "overdue" => TaskStatus::Overdue,
            _ => return None,
        })
    }

    /// Terminal states admit no further transitions except the explicit
    /// reopen of a rejected task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Rejected
        )
    }

    /// States in which a task counts as "open" for overdue purposes.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            TaskStatus::New | TaskStatus::Scheduled | TaskStatus::InProgress | TaskStatus::Overdue
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "low" => Priority::Low,
            "medium" => Priority::Medium,
            "high" => Priority::High,
            "urgent" => Priority::Urgent,
            _ => return None,
        })
    }
}

/// Reviewer decision embedded in the task, distinct from top-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    /// No reviewer configured — the review step passes through automatically.
    Skipped,
}

/// Creator (or delegated approver) decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// One entry in the append-only workflow history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: String,
    pub by_id: String,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// UUID for request tracing across logs.
    pub correlation_id: String,
}

/// Review/approval sub-state plus the full action history.
///
/// History is append-only: transitions push entries, nothing ever removes
/// or rewrites them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowState {
    #[serde(default)]
    pub review: ReviewStatus,
    #[serde(default)]
    pub approval: ApprovalStatus,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub group_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub created_by: String,
    pub assignees: BTreeSet<String>,
    pub reviewer: Option<String>,
    pub due_time: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub workflow: WorkflowState,
    /// Back-reference to the template that generated this instance.
    pub recurring_template_id: Option<String>,
    /// 1-based instance counter within the template.
    pub recurring_instance_number: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version, bumped on every saved transition.
    pub version: i64,
}

impl Task {
    /// Create a fresh task. Initial status is `scheduled` when the due time
    /// lies in the future, `new` otherwise.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        group_id: impl Into<String>,
        title: impl Into<String>,
        created_by: impl Into<String>,
        assignees: BTreeSet<String>,
        reviewer: Option<String>,
        priority: Priority,
        due_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let status = match due_time {
            Some(due) if due > now => TaskStatus::Scheduled,
            _ => TaskStatus::New,
        };
        Self {
            id: super::new_id(),
            group_id: group_id.into(),
            title: title.into(),
            description: None,
            status,
            priority,
            created_by: created_by.into(),
            assignees,
            reviewer,
            due_time,
            submitted_at: None,
            reviewed_at: None,
            approved_at: None,
            completed_at: None,
            workflow: WorkflowState::default(),
            recurring_template_id: None,
            recurring_instance_number: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}
