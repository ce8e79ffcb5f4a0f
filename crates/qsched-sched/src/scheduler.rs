//! The scheduler capability and algorithm selection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use qsched_core::{Assignment, CoreError, Job, Machine};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{SchedError, SchedResult};
use crate::greedy::{GreedyConfig, GreedyScheduler};
use crate::ilp::{IlpConfig, IlpScheduler, WholeJobIlpConfig, WholeJobIlpScheduler};
use crate::milp::{MicroLpSolver, MilpSolver};
use crate::parallel::{ParallelConfig, ParallelScheduler};

/// A scheduling strategy.
///
/// Preconditions: every job fits at least one machine (run the decomposer
/// first). Postconditions: every job appears exactly once in the returned
/// assignment, on a machine with enough capacity, with `end - start` equal
/// to its duration on that machine.
pub trait Scheduler: Send + Sync {
    /// Short algorithm name recorded in reports.
    fn name(&self) -> &str;

    /// Produce an assignment for `jobs` on `machines`.
    fn schedule(&self, jobs: &[Job], machines: &[Machine]) -> SchedResult<Assignment>;
}

/// Threading regime for the stages that can run in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Run on the calling thread, fully deterministic.
    #[default]
    Sequential,
    /// Run on a dedicated worker pool (`0` threads means one per core).
    Parallel { threads: usize },
}

impl ExecutionMode {
    /// Build the worker pool for this mode, `None` when sequential.
    pub fn thread_pool(&self) -> SchedResult<Option<rayon::ThreadPool>> {
        match self {
            ExecutionMode::Sequential => Ok(None),
            ExecutionMode::Parallel { threads } => rayon::ThreadPoolBuilder::new()
                .num_threads(*threads)
                .build()
                .map(Some)
                .map_err(|e| SchedError::InvalidConfig(format!("worker pool: {e}"))),
        }
    }
}

/// The four scheduling algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    /// Capacity-sorted greedy (first-fit decreasing).
    Greedy,
    /// Probabilistic parallel heuristic (multi-thread, multi-chip).
    Parallel,
    /// Time-indexed ILP that packs jobs by capacity.
    Ilp,
    /// Whole-job ILP with affinity pre-scoring.
    WholeJobIlp,
}

impl SchedulerKind {
    /// All algorithms, in the order reports list them.
    pub const ALL: [SchedulerKind; 4] = [
        SchedulerKind::Greedy,
        SchedulerKind::Parallel,
        SchedulerKind::Ilp,
        SchedulerKind::WholeJobIlp,
    ];

    /// Name written to reports.
    pub fn report_name(&self) -> &'static str {
        match self {
            SchedulerKind::Greedy => "FFD",
            SchedulerKind::Parallel => "MTMC",
            SchedulerKind::Ilp => "MILQ",
            SchedulerKind::WholeJobIlp => "NoTaDS",
        }
    }

    /// Whether the algorithm runs one job per machine at a time.
    pub fn is_single_occupancy(&self) -> bool {
        matches!(self, SchedulerKind::Greedy | SchedulerKind::WholeJobIlp)
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerKind::Greedy => "greedy",
            SchedulerKind::Parallel => "parallel",
            SchedulerKind::Ilp => "ilp",
            SchedulerKind::WholeJobIlp => "ilp_whole",
        };
        write!(f, "{name}")
    }
}

impl FromStr for SchedulerKind {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ffd" | "greedy" => Ok(SchedulerKind::Greedy),
            "mtmc" | "parallel" => Ok(SchedulerKind::Parallel),
            "milq" | "milq_extend" | "ilp" => Ok(SchedulerKind::Ilp),
            "notads" | "ilp_whole" => Ok(SchedulerKind::WholeJobIlp),
            other => Err(SchedError::InvalidConfig(format!(
                "unknown algorithm '{other}' (expected ffd, mtmc, milq or notads)"
            ))),
        }
    }
}

/// Settings for every algorithm, so one value can configure whichever is
/// selected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub greedy: GreedyConfig,
    pub parallel: ParallelConfig,
    pub ilp: IlpConfig,
    pub whole_job: WholeJobIlpConfig,
}

/// Build the scheduler for `kind` with the bundled MILP solver.
pub fn build_scheduler(kind: SchedulerKind, settings: &SchedulerSettings) -> Box<dyn Scheduler> {
    build_scheduler_with_solver(kind, settings, Arc::new(MicroLpSolver::new()))
}

/// Build the scheduler for `kind`, handing `solver` to the ILP variants.
pub fn build_scheduler_with_solver(
    kind: SchedulerKind,
    settings: &SchedulerSettings,
    solver: Arc<dyn MilpSolver>,
) -> Box<dyn Scheduler> {
    match kind {
        SchedulerKind::Greedy => Box::new(GreedyScheduler::new(settings.greedy.clone())),
        SchedulerKind::Parallel => Box::new(ParallelScheduler::new(settings.parallel.clone())),
        SchedulerKind::Ilp => Box::new(IlpScheduler::new(settings.ilp.clone(), solver)),
        SchedulerKind::WholeJobIlp => {
            Box::new(WholeJobIlpScheduler::new(settings.whole_job.clone(), solver))
        }
    }
}

/// Reject inputs that no scheduler can handle.
///
/// Checks for duplicate job or machine ids and for jobs that fit no machine.
pub fn validate_input(jobs: &[Job], machines: &[Machine]) -> SchedResult<()> {
    let mut machine_ids = FxHashSet::default();
    for machine in machines {
        if !machine_ids.insert(&machine.id) {
            return Err(SchedError::InvalidConfig(format!(
                "duplicate machine id {}",
                machine.id
            )));
        }
    }

    let mut job_ids = FxHashSet::default();
    for job in jobs {
        if !job_ids.insert(&job.id) {
            return Err(CoreError::DuplicateJob(job.id.to_string()).into());
        }
        if !machines.iter().any(|m| m.fits(job.resource_requirement)) {
            return Err(SchedError::no_feasible_machine(job));
        }
    }
    Ok(())
}

/// Heuristic duration of a job: `requirement x time_per_unit`.
pub fn unit_duration(job: &Job, time_per_unit: f64) -> f64 {
    f64::from(job.resource_requirement) * time_per_unit
}
