//! qsched core: jobs, machines, decomposition and recomposition
//!
//! This crate holds the data model shared by every scheduler and the
//! evaluation layer, plus the two transformations that wrap scheduling:
//!
//! - **Decomposition** splits a job larger than any machine into
//!   capacity-fitting children and records the sampling overhead of the cut.
//! - **Recomposition** merges children co-scheduled on one machine into a
//!   single [`CombinedExecutionUnit`] and splits the combined result back.
//!
//! # Architecture
//!
//! ```text
//! [Jobs] -> JobArena::decompose_oversized -> leaf jobs -> (scheduler)
//!                                                          |
//!                                                          v
//!                                                      Assignment
//!                                                          |
//!                                                          v
//!                             Recomposer::group_concurrent -> units
//!                                                          |
//!                                                 (execution backend)
//!                                                          |
//!                                                          v
//!                                     disaggregate -> per-job results
//! ```
//!
//! # Example
//!
//! ```
//! use qsched_core::{Decomposer, Job, JobArena};
//!
//! let mut arena = JobArena::from_jobs([Job::new("1", 12)?])?;
//! arena.decompose_oversized(5, &Decomposer::default())?;
//! assert_eq!(arena.leaves().count(), 3);
//! # Ok::<(), qsched_core::CoreError>(())
//! ```

pub mod arena;
pub mod assignment;
pub mod decompose;
pub mod error;
pub mod job;
pub mod recompose;

pub use arena::JobArena;
pub use assignment::{Assignment, AssignmentEntry};
pub use decompose::{
    Decomposer, Decomposition, ExponentialOverhead, LinearOverhead, OverheadModel, OverheadPolicy,
};
pub use error::{CoreError, CoreResult};
pub use job::{Job, JobId, Machine, MachineId, Placement, Time, max_capacity};
pub use recompose::{
    CombinedExecutionUnit, ExecutionResult, MergePolicy, Recomposer, UnitMember, disaggregate,
};
