//! Error handling for the schedulers.

use qsched_core::CoreError;
use thiserror::Error;

/// Result type for scheduler operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur while scheduling.
///
/// A solver timeout is not an error: the schedulers return a feasible
/// assignment with `partial_optimality` set instead.
#[derive(Error, Debug)]
pub enum SchedError {
    /// No machine can host the job. The caller skipped decomposition.
    #[error("No feasible machine for job {job} (requires {requirement})")]
    NoFeasibleMachine { job: String, requirement: u32 },

    /// The MILP solver proved the model infeasible.
    #[error("Infeasible schedule: {0}")]
    InfeasibleSchedule(String),

    /// The MILP solver failed for a reason other than infeasibility.
    #[error("Solver error: {0}")]
    Solver(String),

    /// Unknown algorithm name or out-of-range setting.
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    /// IO error (LP export).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the job model.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SchedError {
    pub(crate) fn no_feasible_machine(job: &qsched_core::Job) -> Self {
        SchedError::NoFeasibleMachine {
            job: job.id.to_string(),
            requirement: job.resource_requirement,
        }
    }
}
