//! SQLite adapter for `KpiRepository`.
//!
//! Records are append-only. The per-event uniqueness constraint lives in
//! the `dedupe_key` column; `record_if_absent` is a plain
//! `INSERT OR IGNORE` whose rows_affected answers "was this new".

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::{CoreError, CoreResult};
use crate::model::{KpiKind, KpiRecord, KpiRole, TimeWindow, UserScore};
use crate::ports::KpiRepository;

use super::{from_ts, to_ts, with_timeout};

#[derive(Debug, Clone, sqlx::FromRow)]
struct KpiRow {
    id: String,
    user_id: String,
    group_id: String,
    task_id: Option<String>,
    kind: String,
    points: i64,
    occurred_at: i64,
    metadata: Option<String>,
}

impl TryFrom<KpiRow> for KpiRecord {
    type Error = CoreError;

    fn try_from(row: KpiRow) -> Result<Self, Self::Error> {
        let kind = KpiKind::parse(&row.kind)
            .ok_or_else(|| CoreError::Repository(anyhow!("unknown kpi kind '{}'", row.kind)))?;
        let metadata = row
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| CoreError::Repository(anyhow!("bad kpi metadata json: {e}")))?;
        Ok(KpiRecord {
            id: row.id,
            user_id: row.user_id,
            group_id: row.group_id,
            task_id: row.task_id,
            kind,
            role: kind.role(),
            points: row.points,
            occurred_at: from_ts(row.occurred_at),
            metadata,
        })
    }
}

#[derive(Clone)]
pub struct SqliteKpiRepository {
    pool: SqlitePool,
}

impl SqliteKpiRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KpiRepository for SqliteKpiRepository {
    async fn record_if_absent(&self, record: &KpiRecord) -> CoreResult<bool> {
        let pool = self.pool.clone();
        let dedupe_key = record.dedupe_key();
        let metadata = record
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| CoreError::Repository(anyhow!("serialize kpi metadata: {e}")))?;
        let record = record.clone();
        with_timeout(async move {
            let rows_affected = sqlx::query(
                "INSERT OR IGNORE INTO kpi_records \
                 (id, dedupe_key, user_id, group_id, task_id, kind, role, points, \
                  occurred_at, metadata) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.id)
            .bind(&dedupe_key)
            .bind(&record.user_id)
            .bind(&record.group_id)
            .bind(&record.task_id)
            .bind(record.kind.as_str())
            .bind(record.role.as_str())
            .bind(record.points)
            .bind(to_ts(record.occurred_at))
            .bind(&metadata)
            .execute(&pool)
            .await?
            .rows_affected();
            Ok(rows_affected > 0)
        })
        .await
    }

    async fn aggregate(&self, group_id: &str, window: TimeWindow) -> CoreResult<Vec<UserScore>> {
        let pool = self.pool.clone();
        let group_id = group_id.to_string();
        with_timeout(async move {
            let mut sql = String::from(
                "SELECT user_id, \
                        SUM(points) AS points, \
                        SUM(CASE WHEN role = 'assignee' THEN 1 ELSE 0 END) AS completed_tasks, \
                        MAX(occurred_at) AS achieved_at \
                 FROM kpi_records WHERE group_id = ?",
            );
            if window.since.is_some() {
                sql.push_str(" AND occurred_at >= ?");
            }
            if window.until.is_some() {
                sql.push_str(" AND occurred_at <= ?");
            }
            sql.push_str(" GROUP BY user_id");

            let mut query = sqlx::query_as::<_, (String, i64, i64, i64)>(&sql).bind(&group_id);
            if let Some(since) = window.since {
                query = query.bind(to_ts(since));
            }
            if let Some(until) = window.until {
                query = query.bind(to_ts(until));
            }

            let rows = query.fetch_all(&pool).await?;
            Ok(rows
                .into_iter()
                .map(|(user_id, points, completed_tasks, achieved_at)| UserScore {
                    user_id,
                    points,
                    completed_tasks,
                    achieved_at: from_ts(achieved_at),
                })
                .collect())
        })
        .await
    }

    async fn recent_outcomes(
        &self,
        group_id: &str,
        user_id: &str,
        limit: u32,
    ) -> CoreResult<Vec<KpiRecord>> {
        let pool = self.pool.clone();
        let group_id = group_id.to_string();
        let user_id = user_id.to_string();
        with_timeout(async move {
            let rows: Vec<KpiRow> = sqlx::query_as(
                "SELECT id, user_id, group_id, task_id, kind, points, occurred_at, metadata \
                 FROM kpi_records \
                 WHERE group_id = ? AND user_id = ? \
                   AND kind IN ('assignee_early', 'assignee_ontime', 'assignee_late', \
                                'penalty_overdue') \
                 ORDER BY occurred_at DESC, id DESC \
                 LIMIT ?",
            )
            .bind(&group_id)
            .bind(&user_id)
            .bind(limit as i64)
            .fetch_all(&pool)
            .await?;
            rows.into_iter().map(KpiRecord::try_from).collect()
        })
        .await
    }
}
