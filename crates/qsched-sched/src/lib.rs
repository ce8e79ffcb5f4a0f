//! qsched schedulers
//!
//! Four interchangeable strategies behind one [`Scheduler`] capability:
//!
//! | Kind | Report name | Strategy |
//! |------|-------------|----------|
//! | [`SchedulerKind::Greedy`] | FFD | capacity-sorted first-fit decreasing |
//! | [`SchedulerKind::Parallel`] | MTMC | seeded probabilistic, multi-threaded claiming |
//! | [`SchedulerKind::Ilp`] | MILQ | time-indexed MILP with capacity sharing and setup times |
//! | [`SchedulerKind::WholeJobIlp`] | NoTaDS | whole-job MILP with affinity pre-scoring |
//!
//! All of them take leaf jobs that already fit some machine and return an
//! [`Assignment`](qsched_core::Assignment). The MILP variants talk to a
//! [`MilpSolver`]; the bundled [`MicroLpSolver`] needs no native libraries.
//!
//! # Example
//!
//! ```
//! use qsched_core::{Job, Machine};
//! use qsched_sched::{SchedulerSettings, build_scheduler};
//!
//! let jobs = vec![Job::new("a", 4).unwrap(), Job::new("b", 3).unwrap()];
//! let machines = vec![Machine::new("m0", 5).unwrap(), Machine::new("m1", 5).unwrap()];
//!
//! let scheduler = build_scheduler("ffd".parse().unwrap(), &SchedulerSettings::default());
//! let assignment = scheduler.schedule(&jobs, &machines).unwrap();
//! assert_eq!(assignment.makespan(), 4.0);
//! ```

pub mod affinity;
pub mod error;
pub mod greedy;
pub mod ilp;
pub mod ledger;
pub mod milp;
pub mod parallel;
pub mod scheduler;

pub use affinity::{AffinityScorer, EtaModel, SlackAffinity, TableAffinity};
pub use error::{SchedError, SchedResult};
pub use greedy::{GreedyConfig, GreedyScheduler, Occupancy};
pub use ilp::{IlpConfig, IlpScheduler, WholeJobIlpConfig, WholeJobIlpScheduler};
pub use ledger::CapacityLedger;
pub use milp::{MicroLpSolver, MilpModel, MilpSolution, MilpSolver, SolveOutcome};
pub use parallel::{ParallelConfig, ParallelScheduler};
pub use scheduler::{
    ExecutionMode, Scheduler, SchedulerKind, SchedulerSettings, build_scheduler,
    build_scheduler_with_solver, validate_input,
};
