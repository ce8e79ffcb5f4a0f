//! Execution seam.
//!
//! Running a unit of work on real or simulated hardware happens outside this
//! workspace. The pipeline only needs something that turns a
//! [`CombinedExecutionUnit`] on a [`Machine`] into an [`ExecutionResult`].

use qsched_core::{CombinedExecutionUnit, ExecutionResult, Machine, MachineId};
use thiserror::Error;

/// Failure reported by an execution backend for one unit.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Execution of unit {unit} on {machine} failed: {reason}")]
pub struct ExecutionError {
    pub unit: String,
    pub machine: MachineId,
    pub reason: String,
}

impl ExecutionError {
    /// Create an error for `unit`.
    pub fn new(unit: &CombinedExecutionUnit, reason: impl Into<String>) -> Self {
        Self {
            unit: unit.id.clone(),
            machine: unit.machine.clone(),
            reason: reason.into(),
        }
    }
}

/// Executes combined units. Called concurrently from the execution pool.
pub trait Executor: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str {
        "executor"
    }

    /// Execute `unit` on `machine`.
    fn execute(
        &self,
        unit: &CombinedExecutionUnit,
        machine: &Machine,
    ) -> Result<ExecutionResult, ExecutionError>;
}

impl<F> Executor for F
where
    F: Fn(&CombinedExecutionUnit, &Machine) -> Result<ExecutionResult, ExecutionError>
        + Send
        + Sync,
{
    fn execute(
        &self,
        unit: &CombinedExecutionUnit,
        machine: &Machine,
    ) -> Result<ExecutionResult, ExecutionError> {
        self(unit, machine)
    }
}

/// Returns the same quality for every unit.
///
/// With a duration factor it also reports `actual_duration` as the planned
/// window scaled by that factor, which lets the replay stage be exercised
/// without a backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformExecutor {
    quality: f64,
    duration_factor: Option<f64>,
}

impl Default for UniformExecutor {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl UniformExecutor {
    /// Report `quality` for every unit.
    pub fn new(quality: f64) -> Self {
        Self {
            quality,
            duration_factor: None,
        }
    }

    /// Report actual durations as `factor x planned`.
    pub fn with_duration_factor(mut self, factor: f64) -> Self {
        self.duration_factor = Some(factor);
        self
    }
}

impl Executor for UniformExecutor {
    fn name(&self) -> &str {
        "uniform"
    }

    fn execute(
        &self,
        unit: &CombinedExecutionUnit,
        _machine: &Machine,
    ) -> Result<ExecutionResult, ExecutionError> {
        let result = ExecutionResult::with_quality(self.quality);
        Ok(match self.duration_factor {
            Some(factor) => result.with_actual_duration((unit.end - unit.start) * factor),
            None => result,
        })
    }
}
