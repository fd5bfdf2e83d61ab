//! Recurring template model: the reusable definition from which periodic
//! task instances are generated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Custom,
}

impl RecurrenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceKind::Daily => "daily",
            RecurrenceKind::Weekly => "weekly",
            RecurrenceKind::Monthly => "monthly",
            RecurrenceKind::Quarterly => "quarterly",
            RecurrenceKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "daily" => RecurrenceKind::Daily,
            "weekly" => RecurrenceKind::Weekly,
            "monthly" => RecurrenceKind::Monthly,
            "quarterly" => RecurrenceKind::Quarterly,
            "custom" => RecurrenceKind::Custom,
            _ => return None,
        })
    }
}

/// Parameters steering the next-due computation.
///
/// Which fields matter depends on the kind: `interval` always does;
/// `weekdays` for weekly (and custom when present); `day_of_month` for
/// monthly/quarterly (and custom when present).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceParams {
    /// Step between instances, in kind-specific units (days, weeks, months).
    /// Clamped to a minimum of 1 when read.
    pub interval: u32,
    /// ISO weekday numbers, 1 = Monday .. 7 = Sunday. Empty = no constraint.
    #[serde(default)]
    pub weekdays: Vec<u8>,
    /// Anchor day-of-month, 1..=31. Clamped to the target month's length.
    #[serde(default)]
    pub day_of_month: Option<u8>,
}

impl Default for RecurrenceParams {
    fn default() -> Self {
        Self {
            interval: 1,
            weekdays: Vec::new(),
            day_of_month: None,
        }
    }
}

impl RecurrenceParams {
    pub fn interval(&self) -> u32 {
        self.interval.max(1)
    }

    /// Validate the parameter ranges. Called when a template is created.
    pub fn validate(&self) -> Result<(), String> {
        if self.weekdays.iter().any(|d| !(1..=7).contains(d)) {
            return Err("weekdays must be ISO numbers 1..=7".to_string());
        }
        if let Some(dom) = self.day_of_month {
            if !(1..=31).contains(&dom) {
                return Err("day_of_month must be 1..=31".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringTemplate {
    pub id: String,
    pub group_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub kind: RecurrenceKind,
    pub params: RecurrenceParams,
    /// Due time of the first instance, as an absolute instant.
    pub initial_due: DateTime<Utc>,
    /// Fixed UTC offset of the template's timezone, in minutes.
    /// Date arithmetic happens in this offset, storage stays UTC.
    pub tz_offset_minutes: i32,
    pub assignees: BTreeSet<String>,
    pub reviewer: Option<String>,
    pub created_by: String,
    /// Inactive templates are skipped by the recurrence engine; templates
    /// are deactivated, never deleted.
    pub is_active: bool,
    /// Only ever increases.
    pub total_instances_generated: i64,
    /// Cursor of the most recently generated instance. Never decreases.
    pub last_generated_due: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl RecurringTemplate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        group_id: impl Into<String>,
        title: impl Into<String>,
        created_by: impl Into<String>,
        kind: RecurrenceKind,
        params: RecurrenceParams,
        initial_due: DateTime<Utc>,
        tz_offset_minutes: i32,
        assignees: BTreeSet<String>,
        reviewer: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: super::new_id(),
            group_id: group_id.into(),
            title: title.into(),
            description: None,
            priority: Priority::default(),
            kind,
            params,
            initial_due,
            tz_offset_minutes,
            assignees,
            reviewer,
            created_by: created_by.into(),
            is_active: true,
            total_instances_generated: 0,
            last_generated_due: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}
