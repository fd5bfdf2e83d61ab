//! KPI scoring engine.
//!
//! Consumes task lifecycle events and turns them into immutable point
//! records. Every write goes through `record_if_absent`, so replays and
//! repeated overdue observations are absorbed silently instead of
//! double-scoring.

pub mod leaderboard;
pub mod scoring;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::ScoringConfig;
use crate::error::CoreResult;
use crate::events::TaskEvent;
use crate::model::{KpiKind, KpiRecord, TimeWindow, UserScore};
use crate::ports::KpiRepository;
use scoring::{classify_completion, overdue_penalty_applies};

/// How far back the streak scan looks. Runs longer than this stop counting,
/// which only delays a bonus, never double-grants one.
const STREAK_SCAN_LIMIT: u32 = 200;

pub struct KpiScoringEngine {
    repo: Arc<dyn KpiRepository>,
    config: ScoringConfig,
}

impl KpiScoringEngine {
    pub fn new(repo: Arc<dyn KpiRepository>, config: ScoringConfig) -> Self {
        Self { repo, config }
    }

    /// Score one lifecycle event. Returns the records actually written
    /// (duplicates are absorbed and omitted).
    pub async fn on_event(&self, event: &TaskEvent) -> CoreResult<Vec<KpiRecord>> {
        match event {
            TaskEvent::Completed {
                task_id,
                group_id,
                creator_id,
                assignees,
                due_time,
                completed_at,
            } => {
                self.on_completed(task_id, group_id, creator_id, assignees, *due_time, *completed_at)
                    .await
            }
            TaskEvent::BecameOverdue {
                task_id,
                group_id,
                assignees,
                due_time,
                observed_at,
            } => {
                self.on_overdue(task_id, group_id, assignees, *due_time, *observed_at)
                    .await
            }
        }
    }

    async fn on_completed(
        &self,
        task_id: &str,
        group_id: &str,
        creator_id: &str,
        assignees: &std::collections::BTreeSet<String>,
        due_time: Option<DateTime<Utc>>,
        completed_at: DateTime<Utc>,
    ) -> CoreResult<Vec<KpiRecord>> {
        let bucket = classify_completion(due_time, completed_at);
        let mut written = Vec::new();

        for assignee in assignees {
            let record = KpiRecord::new(
                assignee.clone(),
                group_id,
                Some(task_id.to_string()),
                bucket.kind(),
                bucket.points(&self.config),
                completed_at,
            );
            if self.write(record, &mut written).await? && bucket.is_punctual() {
                self.check_streak(group_id, assignee, task_id, completed_at, &mut written)
                    .await?;
            }
        }

        // Creator records fire alongside the assignee bucket, including
        // when the creator also assigned themselves.
        let completion = KpiRecord::new(
            creator_id,
            group_id,
            Some(task_id.to_string()),
            KpiKind::CreatorCompletion,
            self.config.creator_completion,
            completed_at,
        );
        self.write(completion, &mut written).await?;

        if bucket.is_punctual() {
            let bonus = KpiRecord::new(
                creator_id,
                group_id,
                Some(task_id.to_string()),
                KpiKind::CreatorOntimeBonus,
                self.config.creator_ontime_bonus,
                completed_at,
            );
            self.write(bonus, &mut written).await?;
        }

        Ok(written)
    }

    async fn on_overdue(
        &self,
        task_id: &str,
        group_id: &str,
        assignees: &std::collections::BTreeSet<String>,
        due_time: DateTime<Utc>,
        observed_at: DateTime<Utc>,
    ) -> CoreResult<Vec<KpiRecord>> {
        if !overdue_penalty_applies(due_time, observed_at, &self.config) {
            return Ok(Vec::new());
        }
        let mut written = Vec::new();
        for assignee in assignees {
            let record = KpiRecord::new(
                assignee.clone(),
                group_id,
                Some(task_id.to_string()),
                KpiKind::PenaltyOverdue,
                self.config.penalty_overdue,
                observed_at,
            );
            self.write(record, &mut written).await?;
        }
        Ok(written)
    }

    /// Grant the streak bonus when the run of consecutive punctual
    /// completions reaches a multiple of the configured length. Any late
    /// outcome or overdue penalty in between resets the run.
    async fn check_streak(
        &self,
        group_id: &str,
        user_id: &str,
        task_id: &str,
        occurred_at: DateTime<Utc>,
        written: &mut Vec<KpiRecord>,
    ) -> CoreResult<()> {
        let length = self.config.streak_length.max(1);
        let recent = self
            .repo
            .recent_outcomes(group_id, user_id, STREAK_SCAN_LIMIT)
            .await?;

        let mut run = 0u32;
        for record in &recent {
            if record.kind.extends_streak() {
                run += 1;
            } else {
                break;
            }
        }

        if run > 0 && run % length == 0 {
            let bonus = KpiRecord::new(
                user_id,
                group_id,
                Some(task_id.to_string()),
                KpiKind::StreakBonus,
                self.config.streak_bonus,
                occurred_at,
            );
            self.write(bonus, written).await?;
        }
        Ok(())
    }

    async fn write(&self, record: KpiRecord, written: &mut Vec<KpiRecord>) -> CoreResult<bool> {
        let fresh = self.repo.record_if_absent(&record).await?;
        if fresh {
            debug!(
                user_id = %record.user_id,
                kind = record.kind.as_str(),
                points = record.points,
                "kpi record written"
            );
            written.push(record);
        }
        Ok(fresh)
    }

    /// Aggregate `sum(points)` per user over the window, fully ordered.
    pub async fn leaderboard(&self, group_id: &str, window: TimeWindow) -> CoreResult<Vec<UserScore>> {
        let mut scores = self.repo.aggregate(group_id, window).await?;
        leaderboard::order_scores(&mut scores);
        Ok(scores)
    }
}
