//! qsched evaluation: pipeline orchestration and schedule metrics
//!
//! This crate runs a job set end to end and measures the result:
//!
//! - **Pipeline**: decomposition, scheduling, recomposition, execution
//!   through an [`Executor`], result disaggregation and optional replay with
//!   measured durations
//! - **Metrics**: makespan, turnaround/response time, utilization,
//!   throughput, fidelity and sampling overhead
//! - **Reports**: flat JSON records of the run and of the schedule
//!
//! # Architecture
//!
//! ```text
//! [Jobs + Machines] -> Pipeline
//!                        |
//!          JobArena::decompose_oversized
//!                        |
//!                        v
//!                  Scheduler::schedule
//!                        |
//!                        v
//!           Recomposer::group_concurrent
//!                        |
//!                        v
//!      Executor::execute (rayon pool) -> disaggregate
//!                        |
//!                        v
//!               replay -> compute_metrics
//!                        |
//!                        v
//!                  ScheduleReport
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use qsched_core::{Job, Machine};
//! use qsched_eval::{Pipeline, PipelineConfig, UniformExecutor};
//!
//! let pipeline = Pipeline::new(PipelineConfig::default(), Arc::new(UniformExecutor::new(0.95)));
//! let jobs = vec![Job::new("a", 4)?, Job::new("b", 3)?];
//! let machines = vec![Machine::new("m0", 5)?, Machine::new("m1", 5)?];
//!
//! let outcome = pipeline.run(jobs, &machines)?;
//! assert_eq!(outcome.report.makespan, 4.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod executor;
pub mod metrics;
pub mod pipeline;
pub mod replay;
pub mod report;

pub use error::{EvalError, EvalResult};
pub use executor::{ExecutionError, Executor, UniformExecutor};
pub use metrics::{
    MachineUtilization, MetricsConfig, OverheadAggregation, ScheduleMetrics, UtilizationWindow,
    compute_metrics,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutcome};
pub use replay::replay;
pub use report::{ScheduleRecord, ScheduleReport, render_json, write_json};
