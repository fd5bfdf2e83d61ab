//! Core data model types.

pub mod deletion;
pub mod kpi;
pub mod task;
pub mod template;

pub use deletion::{DeletionRequest, DeletionStatus};
pub use kpi::{KpiKind, KpiRecord, KpiRole, TimeWindow, UserScore};
pub use task::{
    ApprovalStatus, HistoryEntry, Priority, ReviewStatus, Task, TaskStatus, WorkflowState,
};
pub use template::{RecurrenceKind, RecurrenceParams, RecurringTemplate};

/// Generate a new ULID string for entity ids.
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Generate a new correlation ID (UUID v4) for history entries.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
