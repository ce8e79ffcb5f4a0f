//! Pipeline Orchestrator.
//!
//! ```text
//! jobs -> decompose oversized -> schedule leaves -> group concurrent
//!      -> execute units -> disaggregate -> [replay] -> metrics -> report
//! ```

use std::sync::Arc;
use std::time::Instant;

use qsched_core::{
    Assignment, CombinedExecutionUnit, CoreError, Decomposer, ExecutionResult, Job, JobArena,
    JobId, Machine, MergePolicy, OverheadPolicy, Recomposer, Time, disaggregate, max_capacity,
};
use qsched_sched::{
    ExecutionMode, SchedError, Scheduler, SchedulerKind, SchedulerSettings, build_scheduler,
};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EvalError, EvalResult};
use crate::executor::{ExecutionError, Executor};
use crate::metrics::{MetricsConfig, ScheduleMetrics, compute_metrics};
use crate::replay::replay;
use crate::report::ScheduleReport;

/// End-to-end run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Workload family name written to the report.
    pub workload: String,
    /// Scheduling algorithm.
    pub algorithm: SchedulerKind,
    /// Per-algorithm settings.
    pub scheduler: SchedulerSettings,
    /// Overhead law for decomposition.
    pub overhead: OverheadPolicy,
    /// Which co-scheduled jobs are merged for execution.
    pub merge_policy: MergePolicy,
    /// Threading of the execution stage.
    pub execution: ExecutionMode,
    /// Re-time the schedule when the executor reports actual durations.
    pub replay: bool,
    /// Metrics options.
    pub metrics: MetricsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workload: "custom".into(),
            algorithm: SchedulerKind::Greedy,
            scheduler: SchedulerSettings::default(),
            overhead: OverheadPolicy::default(),
            merge_policy: MergePolicy::default(),
            execution: ExecutionMode::default(),
            replay: true,
            metrics: MetricsConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Set the scheduling algorithm.
    pub fn with_algorithm(mut self, algorithm: SchedulerKind) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the workload name.
    pub fn with_workload(mut self, workload: impl Into<String>) -> Self {
        self.workload = workload.into();
        self
    }

    /// Set the decomposition overhead law.
    pub fn with_overhead(mut self, overhead: OverheadPolicy) -> Self {
        self.overhead = overhead;
        self
    }

    /// Set the merge policy.
    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Set the execution-stage threading.
    pub fn with_execution(mut self, mode: ExecutionMode) -> Self {
        self.execution = mode;
        self
    }

    /// Enable or disable replay with actual durations.
    pub fn with_replay(mut self, replay: bool) -> Self {
        self.replay = replay;
        self
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// All jobs, parents included, with placements and results written back.
    pub arena: JobArena,
    /// Final assignment of the leaf jobs (replayed when enabled).
    pub assignment: Assignment,
    /// Units handed to the executor.
    pub units: Vec<CombinedExecutionUnit>,
    pub metrics: ScheduleMetrics,
    pub report: ScheduleReport,
}

/// Runs jobs through decomposition, scheduling, execution and evaluation.
pub struct Pipeline {
    config: PipelineConfig,
    scheduler: Box<dyn Scheduler>,
    executor: Arc<dyn Executor>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler.name())
            .field("executor", &self.executor.name())
            .finish()
    }
}

impl Pipeline {
    /// Create a pipeline using the configured algorithm.
    pub fn new(config: PipelineConfig, executor: Arc<dyn Executor>) -> Self {
        let scheduler = build_scheduler(config.algorithm, &config.scheduler);
        Self {
            config,
            scheduler,
            executor,
        }
    }

    /// Create a pipeline around an already-built scheduler.
    pub fn with_scheduler(
        config: PipelineConfig,
        scheduler: Box<dyn Scheduler>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            config,
            scheduler,
            executor,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run `jobs` on `machines`.
    pub fn run(&self, jobs: Vec<Job>, machines: &[Machine]) -> EvalResult<PipelineOutcome> {
        let limit = max_capacity(machines)
            .ok_or_else(|| SchedError::InvalidConfig("no machines configured".into()))?;

        // 1. Decomposition
        let mut arena = JobArena::from_jobs(jobs)?;
        let decomposer = Decomposer::with_model(self.config.overhead.into_model());
        let decomposed = arena.decompose_oversized(limit, &decomposer)?;
        let leaves = arena.leaf_jobs();
        info!(
            "Pipeline: {} job(s), {} decomposed, {} leaf job(s) on {} machine(s)",
            arena.roots().count(),
            decomposed.len(),
            leaves.len(),
            machines.len()
        );

        // 2. Scheduling
        let started = Instant::now();
        let mut assignment = self.scheduler.schedule(&leaves, machines)?;
        let latency = started.elapsed().as_secs_f64();
        assignment.validate(&leaves, machines)?;
        if assignment.partial_optimality {
            warn!(
                "{} returned a feasible but not proven optimal schedule",
                self.scheduler.name()
            );
        }
        info!(
            "Scheduled with {} in {:.3}s, makespan {}",
            self.scheduler.name(),
            latency,
            assignment.makespan()
        );
        arena.apply_assignment(&assignment)?;

        // 3. Recomposition and execution
        let units = Recomposer::new(self.config.merge_policy).group_concurrent(&assignment)?;
        let results = self.execute_units(&units, machines)?;

        let mut actual: FxHashMap<JobId, Time> = FxHashMap::default();
        for (unit, result) in units.iter().zip(&results) {
            for (job, job_result) in disaggregate(unit, result)? {
                arena.record_result(&job, job_result.result_quality)?;
                if let Some(duration) = job_result.actual_duration {
                    actual.insert(job, duration);
                }
            }
        }

        // 4. Replay
        if self.config.replay && !actual.is_empty() {
            assignment = replay(&assignment, machines, &actual)?;
            arena.apply_assignment(&assignment)?;
            info!("Replayed schedule, makespan now {}", assignment.makespan());
        }

        // 5. Evaluation
        let metrics = compute_metrics(&arena, machines, &self.config.metrics)?;
        let report = ScheduleReport::build(
            &self.config.workload,
            &arena,
            machines,
            &assignment,
            &metrics,
            latency,
        );

        Ok(PipelineOutcome {
            arena,
            assignment,
            units,
            metrics,
            report,
        })
    }

    /// Execute every unit, in unit order.
    fn execute_units(
        &self,
        units: &[CombinedExecutionUnit],
        machines: &[Machine],
    ) -> EvalResult<Vec<ExecutionResult>> {
        let by_id: FxHashMap<_, _> = machines.iter().map(|m| (&m.id, m)).collect();

        let run_one = |unit: &CombinedExecutionUnit| -> EvalResult<ExecutionResult> {
            let machine = by_id
                .get(&unit.machine)
                .copied()
                .ok_or_else(|| CoreError::UnknownMachine(unit.machine.to_string()))?;
            let result = self.executor.execute(unit, machine)?;
            if !(0.0..=1.0).contains(&result.result_quality) {
                return Err(ExecutionError::new(
                    unit,
                    format!("result quality {} outside [0, 1]", result.result_quality),
                )
                .into());
            }
            debug!(
                "Executed unit {} ({} member(s)) on {}",
                unit.id,
                unit.members.len(),
                unit.machine
            );
            Ok(result)
        };

        let pool = self.config.execution.thread_pool()?;
        info!(
            "Executing {} unit(s) with {} ({})",
            units.len(),
            self.executor.name(),
            if pool.is_some() { "pooled" } else { "sequential" }
        );
        match pool {
            Some(pool) => pool.install(|| units.par_iter().map(run_one).collect()),
            None => units.iter().map(run_one).collect(),
        }
    }
}
