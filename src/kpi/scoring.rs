//! Pure completion-timing classification.
//!
//! Exactly one assignee bucket per completion:
//! early (≥ 24h before due), on-time (within ±24h), late (≥ 24h after).
//! Tasks without a due time count as on-time. The separate overdue penalty
//! applies to tasks still open more than the configured window past due.

use chrono::{DateTime, Duration, Utc};

use crate::config::ScoringConfig;
use crate::model::KpiKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionBucket {
    Early,
    Ontime,
    Late,
}

impl CompletionBucket {
    pub fn kind(&self) -> KpiKind {
        match self {
            CompletionBucket::Early => KpiKind::AssigneeEarly,
            CompletionBucket::Ontime => KpiKind::AssigneeOntime,
            CompletionBucket::Late => KpiKind::AssigneeLate,
        }
    }

    pub fn points(&self, config: &ScoringConfig) -> i64 {
        match self {
            CompletionBucket::Early => config.assignee_early,
            CompletionBucket::Ontime => config.assignee_ontime,
            CompletionBucket::Late => config.assignee_late,
        }
    }

    /// Early and on-time completions earn the creator their bonus and
    /// extend assignee streaks.
    pub fn is_punctual(&self) -> bool {
        matches!(self, CompletionBucket::Early | CompletionBucket::Ontime)
    }
}

pub fn classify_completion(
    due_time: Option<DateTime<Utc>>,
    completed_at: DateTime<Utc>,
) -> CompletionBucket {
    let Some(due) = due_time else {
        return CompletionBucket::Ontime;
    };
    let delta = completed_at - due;
    let day = Duration::hours(24);
    if delta <= -day {
        CompletionBucket::Early
    } else if delta < day {
        CompletionBucket::Ontime
    } else {
        CompletionBucket::Late
    }
}

/// Whether an open task observed at `observed_at` has sat past due long
/// enough to earn the overdue penalty.
pub fn overdue_penalty_applies(
    due: DateTime<Utc>,
    observed_at: DateTime<Utc>,
    config: &ScoringConfig,
) -> bool {
    observed_at - due > Duration::hours(config.overdue_penalty_after_hours)
}
