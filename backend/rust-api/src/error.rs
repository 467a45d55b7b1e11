//! Errors surfaced by the snapshot engine and its ports.
//!
//! Shortfalls, empty selections and store races are resolved inside the
//! engine and never show up here; only bad input and persistence failures do.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Assignment {0} not found")]
    AssignmentNotFound(i64),

    #[error("Invalid assignment: {0}")]
    InvalidAssignment(String),

    #[error("Invalid variant {variant_number} for assignment {assignment_id}: expected 1..={max}")]
    InvalidVariant {
        assignment_id: i64,
        variant_number: u32,
        max: u32,
    },

    /// Underlying persistence failed. Propagated as-is, never retried here.
    #[error("Store unavailable: {0:#}")]
    StoreUnavailable(#[source] anyhow::Error),
}

impl From<anyhow::Error> for SnapshotError {
    fn from(err: anyhow::Error) -> Self {
        SnapshotError::StoreUnavailable(err)
    }
}

impl From<validator::ValidationErrors> for SnapshotError {
    fn from(err: validator::ValidationErrors) -> Self {
        SnapshotError::InvalidAssignment(err.to_string())
    }
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;
