//! Abstract interfaces the core consumes.
//!
//! Every engine takes these by `Arc<dyn …>` so each component is
//! independently testable with fakes. Concrete sqlite adapters live in
//! `storage/`; adapters for other backends are out of scope here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreResult;
use crate::model::{DeletionRequest, KpiRecord, RecurringTemplate, Task, TimeWindow, UserScore};

// ─── Repositories ────────────────────────────────────────────────────────────

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn get(&self, id: &str) -> CoreResult<Option<Task>>;

    /// Insert a brand-new task (version 0). Fails on id collision.
    async fn insert(&self, task: &Task) -> CoreResult<()>;

    /// Persist a mutated task. The write only lands when the stored version
    /// still equals `expected_version`; a losing writer gets
    /// `CoreError::Conflict` and must re-read and retry.
    async fn save(&self, task: &Task, expected_version: i64) -> CoreResult<()>;

    /// Open tasks (new/scheduled/in_progress/overdue) whose due time lies
    /// before `before`. Already-overdue tasks are included so repeated
    /// ticks can re-observe them for the late penalty.
    async fn list_due_for_overdue_check(&self, before: DateTime<Utc>) -> CoreResult<Vec<Task>>;

    async fn list_by_recurring_template(&self, template_id: &str) -> CoreResult<Vec<Task>>;
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn get(&self, id: &str) -> CoreResult<Option<RecurringTemplate>>;

    async fn insert(&self, template: &RecurringTemplate) -> CoreResult<()>;

    async fn list_active(&self) -> CoreResult<Vec<RecurringTemplate>>;

    async fn save(&self, template: &RecurringTemplate, expected_version: i64) -> CoreResult<()>;
}

#[async_trait]
pub trait DeletionRequestRepository: Send + Sync {
    async fn get(&self, id: &str) -> CoreResult<Option<DeletionRequest>>;

    async fn get_pending_for_group(&self, group_id: &str) -> CoreResult<Option<DeletionRequest>>;

    async fn insert(&self, request: &DeletionRequest) -> CoreResult<()>;

    async fn save(&self, request: &DeletionRequest, expected_version: i64) -> CoreResult<()>;

    /// Atomically mark the request executed and delete exactly its captured
    /// task ids, in one transaction. The version CAS guarantees at most one
    /// execution even when two approvals race to the threshold.
    async fn execute(&self, request: &DeletionRequest, expected_version: i64) -> CoreResult<()>;
}

#[async_trait]
pub trait KpiRepository: Send + Sync {
    /// Append-only write guarded by the per-event uniqueness key.
    /// Returns `false` when an equal event was already recorded — the
    /// duplicate is absorbed, not an error.
    async fn record_if_absent(&self, record: &KpiRecord) -> CoreResult<bool>;

    /// Sum points per user over the window. Ordering is applied by the
    /// leaderboard module on top of this.
    async fn aggregate(&self, group_id: &str, window: TimeWindow) -> CoreResult<Vec<UserScore>>;

    /// Most recent streak-relevant records for one user, newest first.
    async fn recent_outcomes(
        &self,
        group_id: &str,
        user_id: &str,
        limit: u32,
    ) -> CoreResult<Vec<KpiRecord>>;
}

// ─── Clock ───────────────────────────────────────────────────────────────────

/// Injected time source so tests can simulate many ticks instantly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ─── Notifications ───────────────────────────────────────────────────────────

/// Best-effort group messaging. Implementations must swallow their own
/// failures (log and move on) — a missed notification never fails or rolls
/// back the operation that triggered it.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, group_id: &str, message: &str);
}

/// Default sink: structured log lines only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, group_id: &str, message: &str) {
        tracing::info!(group_id = %group_id, message = %message, "group notification");
    }
}

// ─── Member roster ───────────────────────────────────────────────────────────

/// Group membership lookup, consulted only when a deletion request is
/// created (the quorum is derived from the member count at that instant).
#[async_trait]
pub trait MemberRoster: Send + Sync {
    async fn count_members(&self, group_id: &str) -> CoreResult<u32>;
}
