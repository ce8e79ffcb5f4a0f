//! Error handling for the job model, decomposition and recomposition.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while building or transforming the job model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// A job was constructed with a non-positive resource requirement.
    #[error("Invalid job {id}: {reason}")]
    InvalidJob { id: String, reason: String },

    /// A machine or decomposition limit was given a non-positive capacity.
    #[error("Invalid capacity for {target}: {capacity}")]
    InvalidCapacity { target: String, capacity: i64 },

    /// Two jobs share the same identifier.
    #[error("Duplicate job id: {0}")]
    DuplicateJob(String),

    /// A job id is not present in the arena.
    #[error("Job not found: {0}")]
    UnknownJob(String),

    /// A machine id is not part of the machine set.
    #[error("Machine not found: {0}")]
    UnknownMachine(String),

    /// Internal invariant violated. Indicates a logic bug, never bad input.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn invalid_job(id: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidJob {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
