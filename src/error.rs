//! Core error taxonomy.
//!
//! Engines return `CoreError` so callers can distinguish a rejected
//! transition from a lost write race or a transient storage failure.
//! Duplicate scoring events are absorbed at the repository layer
//! (`record_if_absent`) and never surface here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Attempted status change outside the allowed edge set. The task is
    /// left unchanged.
    #[error("invalid transition: {from} → {requested}")]
    InvalidTransition { from: String, requested: String },

    /// A concurrent writer won the version race. Re-read and retry.
    #[error("conflict: {entity} '{id}' was modified concurrently")]
    Conflict { entity: &'static str, id: String },

    /// A bulk-deletion request is already pending for this group.
    #[error("group '{group_id}' already has a pending deletion request")]
    AlreadyPending { group_id: String },

    /// Approval attempted on an expired, executed, or cancelled request.
    #[error("deletion request '{request_id}' is no longer pending")]
    RequestExpired { request_id: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    /// Transient storage failure. Scheduler ticks retry on the next cycle;
    /// interactive callers surface this for a user-visible retry.
    #[error("repository unavailable: {0}")]
    Repository(anyhow::Error),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn conflict(entity: &'static str, id: impl Into<String>) -> Self {
        Self::Conflict {
            entity,
            id: id.into(),
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(e.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
