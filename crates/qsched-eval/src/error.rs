//! Evaluation error types.

use qsched_core::CoreError;
use qsched_sched::SchedError;
use thiserror::Error;

use crate::executor::ExecutionError;

/// Result type for evaluation operations.
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors that can occur while running or evaluating a schedule.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A leaf job is missing placement or result data.
    #[error("Incomplete assignment: job {job} has no {missing}")]
    IncompleteAssignment { job: String, missing: &'static str },

    /// The execution backend failed or returned an invalid result.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Serialization error.
    #[error("Export error: {0}")]
    Export(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Data model error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Scheduling error.
    #[error(transparent)]
    Sched(#[from] SchedError),
}

impl EvalError {
    pub(crate) fn incomplete(job: impl ToString, missing: &'static str) -> Self {
        EvalError::IncompleteAssignment {
            job: job.to_string(),
            missing,
        }
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(e: serde_json::Error) -> Self {
        EvalError::Export(e.to_string())
    }
}
