//! Probabilistic parallel heuristic (multi-thread, multi-chip).
//!
//! Time advances in discrete steps. At each step every waiting job, in a
//! seeded random order, ranks the machines by free capacity (most idle first)
//! against a snapshot of the [`CapacityLedger`] and claims the first one that
//! still has room. Ranking runs on a worker pool; claiming is serialized by
//! the ledger. A job holds its full requirement on one machine for
//! `requirement x time_per_unit` steps and never migrates.
//!
//! In [`ExecutionMode::Sequential`] runs are reproducible from the seed. In
//! [`ExecutionMode::Parallel`] the schedule is always valid but the winner of
//! a contested claim depends on thread timing.

use qsched_core::{Assignment, AssignmentEntry, Job, Machine, MachineId, Time};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SchedError, SchedResult};
use crate::ledger::CapacityLedger;
use crate::scheduler::{ExecutionMode, Scheduler, unit_duration, validate_input};

/// Configuration for [`ParallelScheduler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Seed for the per-step job order.
    pub seed: u64,
    /// Worker pool used for ranking and claiming.
    pub mode: ExecutionMode,
    /// Processing time per unit of resource requirement.
    pub time_per_unit: f64,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            mode: ExecutionMode::Parallel { threads: 0 },
            time_per_unit: 1.0,
        }
    }
}

impl ParallelConfig {
    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the processing time per resource unit.
    pub fn with_time_per_unit(mut self, time_per_unit: f64) -> Self {
        self.time_per_unit = time_per_unit;
        self
    }
}

/// A job currently holding capacity.
#[derive(Debug)]
struct Running {
    machine: MachineId,
    requirement: u32,
    end: Time,
}

/// Probabilistic parallel scheduler.
#[derive(Debug, Clone, Default)]
pub struct ParallelScheduler {
    config: ParallelConfig,
}

impl ParallelScheduler {
    /// Create a scheduler with the given configuration.
    pub fn new(config: ParallelConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }
}

/// Rank machines by free capacity (descending, then id) and claim the first
/// that still admits the job.
fn claim(job: &Job, snapshot: &[(MachineId, u32)], ledger: &CapacityLedger) -> Option<MachineId> {
    let mut ranked: Vec<&(MachineId, u32)> = snapshot
        .iter()
        .filter(|(_, free)| *free >= job.resource_requirement)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .map(|(id, _)| id)
        .find(|id| ledger.try_claim(id, job.resource_requirement))
        .cloned()
}

impl Scheduler for ParallelScheduler {
    fn name(&self) -> &str {
        "MTMC"
    }

    fn schedule(&self, jobs: &[Job], machines: &[Machine]) -> SchedResult<Assignment> {
        validate_input(jobs, machines)?;

        let pool = self.config.mode.thread_pool()?;
        let ledger = CapacityLedger::new(machines);
        let mut rng = SmallRng::seed_from_u64(self.config.seed);

        let mut pending: Vec<&Job> = jobs.iter().collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        let mut running: Vec<Running> = Vec::new();
        let mut assignment = Assignment::new(self.name());
        let mut now: Time = 0.0;
        let mut steps = 0_usize;

        while !pending.is_empty() {
            steps += 1;
            running.retain(|r| {
                if r.end <= now {
                    ledger.release(&r.machine, r.requirement);
                    false
                } else {
                    true
                }
            });

            let (mut ready, mut waiting): (Vec<&Job>, Vec<&Job>) = std::mem::take(&mut pending)
                .into_iter()
                .partition(|j| j.submission_time <= now);
            ready.shuffle(&mut rng);

            let snapshot = ledger.snapshot();
            let claims: Vec<Option<MachineId>> = match &pool {
                Some(pool) => pool.install(|| {
                    ready
                        .par_iter()
                        .map(|job| claim(job, &snapshot, &ledger))
                        .collect()
                }),
                None => ready
                    .iter()
                    .map(|job| claim(job, &snapshot, &ledger))
                    .collect(),
            };

            for (job, claimed) in ready.into_iter().zip(claims) {
                let Some(machine) = claimed else {
                    waiting.push(job);
                    continue;
                };
                let end = now + unit_duration(job, self.config.time_per_unit);
                debug!(
                    "Step {}: job {} ({}) claimed {} until {}",
                    now, job.id, job.resource_requirement, machine, end
                );
                assignment.push(AssignmentEntry::new(job, machine.clone(), now, end));
                running.push(Running {
                    machine,
                    requirement: job.resource_requirement,
                    end,
                });
            }

            waiting.sort_by(|a, b| a.id.cmp(&b.id));
            pending = waiting;
            if pending.is_empty() {
                break;
            }

            // Nothing changes until a job finishes or a new one arrives.
            let next_finish = running.iter().map(|r| r.end).reduce(f64::min);
            let next_arrival = pending
                .iter()
                .map(|j| j.submission_time)
                .filter(|t| *t > now)
                .reduce(f64::min);
            now = match (next_finish, next_arrival) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) | (None, Some(a)) => a,
                (None, None) => return Err(SchedError::no_feasible_machine(pending[0])),
            };
        }

        assignment.sort();
        info!(
            "MTMC scheduled {} job(s) in {} step(s), makespan {}",
            assignment.len(),
            steps,
            assignment.makespan()
        );
        Ok(assignment)
    }
}
