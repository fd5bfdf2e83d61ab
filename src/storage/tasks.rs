//! SQLite adapter for `TaskRepository`.
//!
//! Optimistic concurrency: `save` only lands when the stored version still
//! matches, via `UPDATE … WHERE id = ? AND version = ?` — rows_affected 0
//! means a concurrent writer won and the caller gets `Conflict`.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::BTreeSet;

use crate::error::{CoreError, CoreResult};
use crate::model::{Priority, Task, TaskStatus, WorkflowState};
use crate::ports::TaskRepository;

use super::{from_ts, opt_from_ts, opt_ts, to_ts, with_timeout};

#[derive(Debug, Clone, sqlx::FromRow)]
struct TaskRow {
    id: String,
    group_id: String,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    created_by: String,
    assignees: String,
    reviewer: Option<String>,
    due_time: Option<i64>,
    submitted_at: Option<i64>,
    reviewed_at: Option<i64>,
    approved_at: Option<i64>,
    completed_at: Option<i64>,
    workflow: String,
    recurring_template_id: Option<String>,
    recurring_instance_number: Option<i64>,
    created_at: i64,
    updated_at: i64,
    version: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = CoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::parse(&row.status)
            .ok_or_else(|| CoreError::Repository(anyhow!("unknown task status '{}'", row.status)))?;
        let priority = Priority::parse(&row.priority).ok_or_else(|| {
            CoreError::Repository(anyhow!("unknown task priority '{}'", row.priority))
        })?;
        let assignees: BTreeSet<String> = serde_json::from_str(&row.assignees)
            .map_err(|e| CoreError::Repository(anyhow!("bad assignees json: {e}")))?;
        let workflow: WorkflowState = serde_json::from_str(&row.workflow)
            .map_err(|e| CoreError::Repository(anyhow!("bad workflow json: {e}")))?;
        Ok(Task {
            id: row.id,
            group_id: row.group_id,
            title: row.title,
            description: row.description,
            status,
            priority,
            created_by: row.created_by,
            assignees,
            reviewer: row.reviewer,
            due_time: opt_from_ts(row.due_time),
            submitted_at: opt_from_ts(row.submitted_at),
            reviewed_at: opt_from_ts(row.reviewed_at),
            approved_at: opt_from_ts(row.approved_at),
            completed_at: opt_from_ts(row.completed_at),
            workflow,
            recurring_template_id: row.recurring_template_id,
            recurring_instance_number: row.recurring_instance_number,
            created_at: from_ts(row.created_at),
            updated_at: from_ts(row.updated_at),
            version: row.version,
        })
    }
}

fn assignees_json(task: &Task) -> CoreResult<String> {
    serde_json::to_string(&task.assignees)
        .map_err(|e| CoreError::Repository(anyhow!("serialize assignees: {e}")))
}

fn workflow_json(task: &Task) -> CoreResult<String> {
    serde_json::to_string(&task.workflow)
        .map_err(|e| CoreError::Repository(anyhow!("serialize workflow: {e}")))
}

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn get(&self, id: &str) -> CoreResult<Option<Task>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        with_timeout(async move {
            let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
                .bind(&id)
                .fetch_optional(&pool)
                .await?;
            row.map(Task::try_from).transpose()
        })
        .await
    }

    async fn insert(&self, task: &Task) -> CoreResult<()> {
        let pool = self.pool.clone();
        let assignees = assignees_json(task)?;
        let workflow = workflow_json(task)?;
        let task = task.clone();
        with_timeout(async move {
            sqlx::query(
                "INSERT INTO tasks (id, group_id, title, description, status, priority, \
                 created_by, assignees, reviewer, due_time, submitted_at, reviewed_at, \
                 approved_at, completed_at, workflow, recurring_template_id, \
                 recurring_instance_number, created_at, updated_at, version) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&task.id)
            .bind(&task.group_id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.status.as_str())
            .bind(task.priority.as_str())
            .bind(&task.created_by)
            .bind(&assignees)
            .bind(&task.reviewer)
            .bind(opt_ts(task.due_time))
            .bind(opt_ts(task.submitted_at))
            .bind(opt_ts(task.reviewed_at))
            .bind(opt_ts(task.approved_at))
            .bind(opt_ts(task.completed_at))
            .bind(&workflow)
            .bind(&task.recurring_template_id)
            .bind(task.recurring_instance_number)
            .bind(to_ts(task.created_at))
            .bind(to_ts(task.updated_at))
            .bind(task.version)
            .execute(&pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn save(&self, task: &Task, expected_version: i64) -> CoreResult<()> {
        let pool = self.pool.clone();
        let assignees = assignees_json(task)?;
        let workflow = workflow_json(task)?;
        let task = task.clone();
        with_timeout(async move {
            let rows_affected = sqlx::query(
                "UPDATE tasks SET group_id = ?, title = ?, description = ?, status = ?, \
                 priority = ?, created_by = ?, assignees = ?, reviewer = ?, due_time = ?, \
                 submitted_at = ?, reviewed_at = ?, approved_at = ?, completed_at = ?, \
                 workflow = ?, recurring_template_id = ?, recurring_instance_number = ?, \
                 updated_at = ?, version = ? \
                 WHERE id = ? AND version = ?",
            )
            .bind(&task.group_id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.status.as_str())
            .bind(task.priority.as_str())
            .bind(&task.created_by)
            .bind(&assignees)
            .bind(&task.reviewer)
            .bind(opt_ts(task.due_time))
            .bind(opt_ts(task.submitted_at))
            .bind(opt_ts(task.reviewed_at))
            .bind(opt_ts(task.approved_at))
            .bind(opt_ts(task.completed_at))
            .bind(&workflow)
            .bind(&task.recurring_template_id)
            .bind(task.recurring_instance_number)
            .bind(to_ts(task.updated_at))
            .bind(task.version)
            .bind(&task.id)
            .bind(expected_version)
            .execute(&pool)
            .await?
            .rows_affected();

            if rows_affected == 0 {
                return Err(CoreError::conflict("task", task.id.clone()));
            }
            Ok(())
        })
        .await
    }

    async fn list_due_for_overdue_check(&self, before: DateTime<Utc>) -> CoreResult<Vec<Task>> {
        let pool = self.pool.clone();
        let before = to_ts(before);
        with_timeout(async move {
            let rows: Vec<TaskRow> = sqlx::query_as(
                "SELECT * FROM tasks \
                 WHERE due_time IS NOT NULL AND due_time < ? \
                   AND status IN ('new', 'scheduled', 'in_progress', 'overdue') \
                 ORDER BY due_time ASC",
            )
            .bind(before)
            .fetch_all(&pool)
            .await?;
            rows.into_iter().map(Task::try_from).collect()
        })
        .await
    }

    async fn list_by_recurring_template(&self, template_id: &str) -> CoreResult<Vec<Task>> {
        let pool = self.pool.clone();
        let template_id = template_id.to_string();
        with_timeout(async move {
            let rows: Vec<TaskRow> = sqlx::query_as(
                "SELECT * FROM tasks WHERE recurring_template_id = ? \
                 ORDER BY recurring_instance_number ASC",
            )
            .bind(&template_id)
            .fetch_all(&pool)
            .await?;
            rows.into_iter().map(Task::try_from).collect()
        })
        .await
    }
}
