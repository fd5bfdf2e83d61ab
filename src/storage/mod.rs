//! SQLite persistence (WAL mode — crash-safe task persistence).
//!
//! One `Storage` handle owns the connection pool; the repository adapters
//! in the sibling modules clone it. Schema setup is idempotent DDL —
//! schema *evolution* is a concern of external migration tooling, not this
//! crate.

pub mod deletion;
pub mod kpi;
pub mod tasks;
pub mod templates;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

pub use deletion::SqliteDeletionRequestRepository;
pub use kpi::SqliteKpiRepository;
pub use tasks::SqliteTaskRepository;
pub use templates::SqliteTemplateRepository;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the daemon indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
pub(crate) async fn with_timeout<T>(
    fut: impl std::future::Future<Output = crate::error::CoreResult<T>>,
) -> crate::error::CoreResult<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(crate::error::CoreError::Repository(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        ))),
    }
}

// ─── Timestamp helpers ───────────────────────────────────────────────────────

pub(crate) fn to_ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

pub(crate) fn opt_ts(dt: Option<DateTime<Utc>>) -> Option<i64> {
    dt.map(to_ts)
}

pub(crate) fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

pub(crate) fn opt_from_ts(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.map(from_ts)
}

// ─── Storage ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("taskhive.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true)
                .log_slow_statements(log::LevelFilter::Warn, std::time::Duration::from_millis(100));

        let pool = SqlitePool::connect_with(opts).await?;
        Self::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    pub fn tasks(&self) -> SqliteTaskRepository {
        SqliteTaskRepository::new(self.pool())
    }

    pub fn templates(&self) -> SqliteTemplateRepository {
        SqliteTemplateRepository::new(self.pool())
    }

    pub fn deletion_requests(&self) -> SqliteDeletionRequestRepository {
        SqliteDeletionRequestRepository::new(self.pool())
    }

    pub fn kpi(&self) -> SqliteKpiRepository {
        SqliteKpiRepository::new(self.pool())
    }

    async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
        let ddl = [
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                created_by TEXT NOT NULL,
                assignees TEXT NOT NULL,
                reviewer TEXT,
                due_time INTEGER,
                submitted_at INTEGER,
                reviewed_at INTEGER,
                approved_at INTEGER,
                completed_at INTEGER,
                workflow TEXT NOT NULL,
                recurring_template_id TEXT,
                recurring_instance_number INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                version INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_tasks_overdue ON tasks(status, due_time)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_template ON tasks(recurring_template_id)",
            "CREATE TABLE IF NOT EXISTS recurring_templates (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                priority TEXT NOT NULL,
                kind TEXT NOT NULL,
                params TEXT NOT NULL,
                initial_due INTEGER NOT NULL,
                tz_offset_minutes INTEGER NOT NULL,
                assignees TEXT NOT NULL,
                reviewer TEXT,
                created_by TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                total_instances_generated INTEGER NOT NULL DEFAULT 0,
                last_generated_due INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                version INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_templates_active ON recurring_templates(is_active)",
            "CREATE TABLE IF NOT EXISTS deletion_requests (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL,
                requested_by TEXT NOT NULL,
                task_ids TEXT NOT NULL,
                total_members_at_creation INTEGER NOT NULL,
                required_approvals INTEGER NOT NULL,
                approvals TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                resolved_at INTEGER,
                version INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_deletion_pending ON deletion_requests(group_id, status)",
            "CREATE TABLE IF NOT EXISTS kpi_records (
                id TEXT PRIMARY KEY,
                dedupe_key TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                group_id TEXT NOT NULL,
                task_id TEXT,
                kind TEXT NOT NULL,
                role TEXT NOT NULL,
                points INTEGER NOT NULL,
                occurred_at INTEGER NOT NULL,
                metadata TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_kpi_group_time ON kpi_records(group_id, occurred_at)",
            "CREATE INDEX IF NOT EXISTS idx_kpi_user_time ON kpi_records(group_id, user_id, occurred_at)",
        ];
        for stmt in ddl {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .context("failed to apply schema")?;
        }
        Ok(())
    }
}
