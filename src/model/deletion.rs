//! Bulk-deletion request model. One pending request per group; a quorum of
//! distinct member approvals executes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStatus {
    Pending,
    Executed,
    Cancelled,
}

impl DeletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionStatus::Pending => "pending",
            DeletionStatus::Executed => "executed",
            DeletionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => DeletionStatus::Pending,
            "executed" => DeletionStatus::Executed,
            "cancelled" => DeletionStatus::Cancelled,
            _ => return None,
        })
    }
}

/// Quorum rule: a third of the group, rounded up, at least one.
pub fn required_approvals(total_members: u32) -> u32 {
    (total_members.div_ceil(3)).max(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub id: String,
    pub group_id: String,
    pub requested_by: String,
    /// Captured at creation time. Tasks added to the group afterwards are
    /// unaffected by execution.
    pub task_ids: Vec<String>,
    pub total_members_at_creation: u32,
    pub required_approvals: u32,
    /// Distinct member ids. A set, so repeat votes cannot double count.
    pub approvals: BTreeSet<String>,
    pub status: DeletionStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl DeletionRequest {
    pub fn new(
        group_id: impl Into<String>,
        task_ids: Vec<String>,
        requested_by: impl Into<String>,
        total_members: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: super::new_id(),
            group_id: group_id.into(),
            requested_by: requested_by.into(),
            task_ids,
            total_members_at_creation: total_members,
            required_approvals: required_approvals(total_members),
            approvals: BTreeSet::new(),
            status: DeletionStatus::Pending,
            created_at: now,
            resolved_at: None,
            version: 0,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.required_approvals
            .saturating_sub(self.approvals.len() as u32)
    }
}
