//! SQLite adapter for `DeletionRequestRepository`.
//!
//! `execute` flips the request to executed and deletes its captured task
//! ids inside one transaction, CAS-ed on the request version — the loser
//! of a racing double-approval gets `Conflict` and nothing is deleted
//! twice or partially.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::BTreeSet;

use crate::error::{CoreError, CoreResult};
use crate::model::{DeletionRequest, DeletionStatus};
use crate::ports::DeletionRequestRepository;

use super::{from_ts, opt_from_ts, opt_ts, to_ts, with_timeout};

#[derive(Debug, Clone, sqlx::FromRow)]
struct RequestRow {
    id: String,
    group_id: String,
    requested_by: String,
    task_ids: String,
    total_members_at_creation: i64,
    required_approvals: i64,
    approvals: String,
    status: String,
    created_at: i64,
    resolved_at: Option<i64>,
    version: i64,
}

impl TryFrom<RequestRow> for DeletionRequest {
    type Error = CoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status = DeletionStatus::parse(&row.status).ok_or_else(|| {
            CoreError::Repository(anyhow!("unknown deletion status '{}'", row.status))
        })?;
        let task_ids: Vec<String> = serde_json::from_str(&row.task_ids)
            .map_err(|e| CoreError::Repository(anyhow!("bad task_ids json: {e}")))?;
        let approvals: BTreeSet<String> = serde_json::from_str(&row.approvals)
            .map_err(|e| CoreError::Repository(anyhow!("bad approvals json: {e}")))?;
        Ok(DeletionRequest {
            id: row.id,
            group_id: row.group_id,
            requested_by: row.requested_by,
            task_ids,
            total_members_at_creation: row.total_members_at_creation as u32,
            required_approvals: row.required_approvals as u32,
            approvals,
            status,
            created_at: from_ts(row.created_at),
            resolved_at: opt_from_ts(row.resolved_at),
            version: row.version,
        })
    }
}

fn task_ids_json(request: &DeletionRequest) -> CoreResult<String> {
    serde_json::to_string(&request.task_ids)
        .map_err(|e| CoreError::Repository(anyhow!("serialize task_ids: {e}")))
}

fn approvals_json(request: &DeletionRequest) -> CoreResult<String> {
    serde_json::to_string(&request.approvals)
        .map_err(|e| CoreError::Repository(anyhow!("serialize approvals: {e}")))
}

#[derive(Clone)]
pub struct SqliteDeletionRequestRepository {
    pool: SqlitePool,
}

impl SqliteDeletionRequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeletionRequestRepository for SqliteDeletionRequestRepository {
    async fn get(&self, id: &str) -> CoreResult<Option<DeletionRequest>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        with_timeout(async move {
            let row: Option<RequestRow> =
                sqlx::query_as("SELECT * FROM deletion_requests WHERE id = ?")
                    .bind(&id)
                    .fetch_optional(&pool)
                    .await?;
            row.map(DeletionRequest::try_from).transpose()
        })
        .await
    }

    async fn get_pending_for_group(&self, group_id: &str) -> CoreResult<Option<DeletionRequest>> {
        let pool = self.pool.clone();
        let group_id = group_id.to_string();
        with_timeout(async move {
            let row: Option<RequestRow> = sqlx::query_as(
                "SELECT * FROM deletion_requests WHERE group_id = ? AND status = 'pending' \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(&group_id)
            .fetch_optional(&pool)
            .await?;
            row.map(DeletionRequest::try_from).transpose()
        })
        .await
    }

    async fn insert(&self, request: &DeletionRequest) -> CoreResult<()> {
        let pool = self.pool.clone();
        let task_ids = task_ids_json(request)?;
        let approvals = approvals_json(request)?;
        let request = request.clone();
        with_timeout(async move {
            sqlx::query(
                "INSERT INTO deletion_requests (id, group_id, requested_by, task_ids, \
                 total_members_at_creation, required_approvals, approvals, status, \
                 created_at, resolved_at, version) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&request.id)
            .bind(&request.group_id)
            .bind(&request.requested_by)
            .bind(&task_ids)
            .bind(request.total_members_at_creation as i64)
            .bind(request.required_approvals as i64)
            .bind(&approvals)
            .bind(request.status.as_str())
            .bind(to_ts(request.created_at))
            .bind(opt_ts(request.resolved_at))
            .bind(request.version)
            .execute(&pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn save(&self, request: &DeletionRequest, expected_version: i64) -> CoreResult<()> {
        let pool = self.pool.clone();
        let approvals = approvals_json(request)?;
        let request = request.clone();
        with_timeout(async move {
            let rows_affected = sqlx::query(
                "UPDATE deletion_requests SET approvals = ?, status = ?, resolved_at = ?, \
                 version = ? \
                 WHERE id = ? AND version = ?",
            )
            .bind(&approvals)
            .bind(request.status.as_str())
            .bind(opt_ts(request.resolved_at))
            .bind(request.version)
            .bind(&request.id)
            .bind(expected_version)
            .execute(&pool)
            .await?
            .rows_affected();

            if rows_affected == 0 {
                return Err(CoreError::conflict("deletion request", request.id.clone()));
            }
            Ok(())
        })
        .await
    }

    async fn execute(&self, request: &DeletionRequest, expected_version: i64) -> CoreResult<()> {
        let pool = self.pool.clone();
        let approvals = approvals_json(request)?;
        let request = request.clone();
        with_timeout(async move {
            let mut tx = pool.begin().await?;

            let rows_affected = sqlx::query(
                "UPDATE deletion_requests SET approvals = ?, status = 'executed', \
                 resolved_at = ?, version = ? \
                 WHERE id = ? AND version = ? AND status = 'pending'",
            )
            .bind(&approvals)
            .bind(opt_ts(request.resolved_at))
            .bind(request.version)
            .bind(&request.id)
            .bind(expected_version)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if rows_affected == 0 {
                // Another approval won the race; roll back without touching
                // any task.
                tx.rollback().await?;
                return Err(CoreError::conflict("deletion request", request.id.clone()));
            }

            // Exactly the ids captured at creation time. Tasks added to the
            // group afterwards are untouched; ids already gone are no-ops.
            for task_id in &request.task_ids {
                sqlx::query("DELETE FROM tasks WHERE id = ?")
                    .bind(task_id)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            Ok(())
        })
        .await
    }
}
