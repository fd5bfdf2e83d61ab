//! SQLite adapter for `TemplateRepository`.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::BTreeSet;

use crate::error::{CoreError, CoreResult};
use crate::model::{Priority, RecurrenceKind, RecurrenceParams, RecurringTemplate};
use crate::ports::TemplateRepository;

use super::{from_ts, opt_from_ts, opt_ts, to_ts, with_timeout};

#[derive(Debug, Clone, sqlx::FromRow)]
struct TemplateRow {
    id: String,
    group_id: String,
    title: String,
    description: Option<String>,
    priority: String,
    kind: String,
    params: String,
    initial_due: i64,
    tz_offset_minutes: i64,
    assignees: String,
    reviewer: Option<String>,
    created_by: String,
    is_active: bool,
    total_instances_generated: i64,
    last_generated_due: Option<i64>,
    created_at: i64,
    updated_at: i64,
    version: i64,
}

impl TryFrom<TemplateRow> for RecurringTemplate {
    type Error = CoreError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let kind = RecurrenceKind::parse(&row.kind).ok_or_else(|| {
            CoreError::Repository(anyhow!("unknown recurrence kind '{}'", row.kind))
        })?;
        let priority = Priority::parse(&row.priority).ok_or_else(|| {
            CoreError::Repository(anyhow!("unknown priority '{}'", row.priority))
        })?;
        let params: RecurrenceParams = serde_json::from_str(&row.params)
            .map_err(|e| CoreError::Repository(anyhow!("bad recurrence params json: {e}")))?;
        let assignees: BTreeSet<String> = serde_json::from_str(&row.assignees)
            .map_err(|e| CoreError::Repository(anyhow!("bad assignees json: {e}")))?;
        Ok(RecurringTemplate {
            id: row.id,
            group_id: row.group_id,
            title: row.title,
            description: row.description,
            priority,
            kind,
            params,
            initial_due: from_ts(row.initial_due),
            tz_offset_minutes: row.tz_offset_minutes as i32,
            assignees,
            reviewer: row.reviewer,
            created_by: row.created_by,
            is_active: row.is_active,
            total_instances_generated: row.total_instances_generated,
            last_generated_due: opt_from_ts(row.last_generated_due),
            created_at: from_ts(row.created_at),
            updated_at: from_ts(row.updated_at),
            version: row.version,
        })
    }
}

#[derive(Clone)]
pub struct SqliteTemplateRepository {
    pool: SqlitePool,
}

impl SqliteTemplateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn params_json(template: &RecurringTemplate) -> CoreResult<String> {
    serde_json::to_string(&template.params)
        .map_err(|e| CoreError::Repository(anyhow!("serialize params: {e}")))
}

fn assignees_json(template: &RecurringTemplate) -> CoreResult<String> {
    serde_json::to_string(&template.assignees)
        .map_err(|e| CoreError::Repository(anyhow!("serialize assignees: {e}")))
}

#[async_trait]
impl TemplateRepository for SqliteTemplateRepository {
    async fn get(&self, id: &str) -> CoreResult<Option<RecurringTemplate>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        with_timeout(async move {
            let row: Option<TemplateRow> =
                sqlx::query_as("SELECT * FROM recurring_templates WHERE id = ?")
                    .bind(&id)
                    .fetch_optional(&pool)
                    .await?;
            row.map(RecurringTemplate::try_from).transpose()
        })
        .await
    }

    async fn insert(&self, template: &RecurringTemplate) -> CoreResult<()> {
        let pool = self.pool.clone();
        let params = params_json(template)?;
        let assignees = assignees_json(template)?;
        let template = template.clone();
        with_timeout(async move {
            sqlx::query(
                "INSERT INTO recurring_templates (id, group_id, title, description, priority, \
                 kind, params, initial_due, tz_offset_minutes, assignees, reviewer, created_by, \
                 is_active, total_instances_generated, last_generated_due, created_at, \
                 updated_at, version) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&template.id)
            .bind(&template.group_id)
            .bind(&template.title)
            .bind(&template.description)
            .bind(template.priority.as_str())
            .bind(template.kind.as_str())
            .bind(&params)
            .bind(to_ts(template.initial_due))
            .bind(template.tz_offset_minutes)
            .bind(&assignees)
            .bind(&template.reviewer)
            .bind(&template.created_by)
            .bind(template.is_active)
            .bind(template.total_instances_generated)
            .bind(opt_ts(template.last_generated_due))
            .bind(to_ts(template.created_at))
            .bind(to_ts(template.updated_at))
            .bind(template.version)
            .execute(&pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn list_active(&self) -> CoreResult<Vec<RecurringTemplate>> {
        let pool = self.pool.clone();
        with_timeout(async move {
            let rows: Vec<TemplateRow> = sqlx::query_as(
                "SELECT * FROM recurring_templates WHERE is_active = 1 ORDER BY created_at ASC",
            )
            .fetch_all(&pool)
            .await?;
            rows.into_iter().map(RecurringTemplate::try_from).collect()
        })
        .await
    }

    async fn save(&self, template: &RecurringTemplate, expected_version: i64) -> CoreResult<()> {
        let pool = self.pool.clone();
        let params = params_json(template)?;
        let assignees = assignees_json(template)?;
        let template = template.clone();
        with_timeout(async move {
            let rows_affected = sqlx::query(
                "UPDATE recurring_templates SET group_id = ?, title = ?, description = ?, \
                 priority = ?, kind = ?, params = ?, initial_due = ?, tz_offset_minutes = ?, \
                 assignees = ?, reviewer = ?, created_by = ?, is_active = ?, \
                 total_instances_generated = ?, last_generated_due = ?, updated_at = ?, \
                 version = ? \
                 WHERE id = ? AND version = ?",
            )
            .bind(&template.group_id)
            .bind(&template.title)
            .bind(&template.description)
            .bind(template.priority.as_str())
            .bind(template.kind.as_str())
            .bind(&params)
            .bind(to_ts(template.initial_due))
            .bind(template.tz_offset_minutes)
            .bind(&assignees)
            .bind(&template.reviewer)
            .bind(&template.created_by)
            .bind(template.is_active)
            .bind(template.total_instances_generated)
            .bind(opt_ts(template.last_generated_due))
            .bind(to_ts(template.updated_at))
            .bind(template.version)
            .bind(&template.id)
            .bind(expected_version)
            .execute(&pool)
            .await?
            .rows_affected();

            if rows_affected == 0 {
                return Err(CoreError::conflict("template", template.id.clone()));
            }
            Ok(())
        })
        .await
    }
}
