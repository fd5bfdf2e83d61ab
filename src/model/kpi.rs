//! KPI scoring records and leaderboard aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scoring event kinds. Each (task, kind, user) triple is written at most
/// once — the dedupe key below enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiKind {
    AssigneeEarly,
    AssigneeOntime,
    AssigneeLate,
    CreatorCompletion,
    CreatorOntimeBonus,
    StreakBonus,
    PenaltyOverdue,
}

impl KpiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KpiKind::AssigneeEarly => "assignee_early",
            KpiKind::AssigneeOntime => "assignee_ontime",
            KpiKind::AssigneeLate => "assignee_late",
            KpiKind::CreatorCompletion => "creator_completion",
            KpiKind::CreatorOntimeBonus => "creator_ontime_bonus",
            KpiKind::StreakBonus => "streak_bonus",
            KpiKind::PenaltyOverdue => "penalty_overdue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "assignee_early" => KpiKind::AssigneeEarly,
            "assignee_ontime" => KpiKind::AssigneeOntime,
            "assignee_late" => KpiKind::AssigneeLate,
            "creator_completion" => KpiKind::CreatorCompletion,
            "creator_ontime_bonus" => KpiKind::CreatorOntimeBonus,
            "streak_bonus" => KpiKind::StreakBonus,
            "penalty_overdue" => KpiKind::PenaltyOverdue,
            _ => return None,
        })
    }

    pub fn role(&self) -> KpiRole {
        match self {
            KpiKind::AssigneeEarly | KpiKind::AssigneeOntime | KpiKind::AssigneeLate => {
                KpiRole::Assignee
            }
            KpiKind::CreatorCompletion | KpiKind::CreatorOntimeBonus => KpiRole::Creator,
            KpiKind::StreakBonus => KpiRole::Bonus,
            KpiKind::PenaltyOverdue => KpiRole::Penalty,
        }
    }

    /// Kinds that participate in streak runs (assignee completion outcomes
    /// plus the penalty that breaks a run).
    pub fn affects_streak(&self) -> bool {
        matches!(
            self,
            KpiKind::AssigneeEarly
                | KpiKind::AssigneeOntime
                | KpiKind::AssigneeLate
                | KpiKind::PenaltyOverdue
        )
    }

    /// Kinds that extend a streak run.
    pub fn extends_streak(&self) -> bool {
        matches!(self, KpiKind::AssigneeEarly | KpiKind::AssigneeOntime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiRole {
    Assignee,
    Creator,
    Bonus,
    Penalty,
}

impl KpiRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            KpiRole::Assignee => "assignee",
            KpiRole::Creator => "creator",
            KpiRole::Bonus => "bonus",
            KpiRole::Penalty => "penalty",
        }
    }
}

/// One immutable scoring record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiRecord {
    pub id: String,
    pub user_id: String,
    pub group_id: String,
    pub task_id: Option<String>,
    pub kind: KpiKind,
    pub role: KpiRole,
    pub points: i64,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl KpiRecord {
    pub fn new(
        user_id: impl Into<String>,
        group_id: impl Into<String>,
        task_id: Option<String>,
        kind: KpiKind,
        points: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: super::new_id(),
            user_id: user_id.into(),
            group_id: group_id.into(),
            task_id,
            kind,
            role: kind.role(),
            points,
            occurred_at,
            metadata: None,
        }
    }

    /// Uniqueness key preventing double-scoring of the same event:
    /// one record per (task, kind, user).
    pub fn dedupe_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.task_id.as_deref().unwrap_or("-"),
            self.kind.as_str(),
            self.user_id
        )
    }
}

/// Leaderboard aggregation window. `None` bounds are open.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            until: None,
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserScore {
    pub user_id: String,
    pub points: i64,
    /// Completed-task count (assignee outcome records) — first tie-break.
    pub completed_tasks: i64,
    /// When the current score was reached — second tie-break, earlier wins.
    pub achieved_at: DateTime<Utc>,
}
