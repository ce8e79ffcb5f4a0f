//! Time-indexed ILP that packs jobs into machine capacity.
//!
//! Variables:
//! - `x[j,m]` job `j` runs on machine `m` (valid pairings only)
//! - `z[j,m,t]` job `j` occupies machine `m` in slot `t`
//! - `s[j]`, `c[j]` start and completion
//! - `cmax` the makespan
//!
//! Time is a grid of unit slots: processing times must be whole slots,
//! releases and setup gaps are rounded up to the next slot. The occupied
//! slots of a job are forced to be exactly the `p[j,m]` integer slots of
//! `[s[j], c[j])`, and the summed requirement of jobs occupying a
//! machine in a slot may not exceed its capacity. When setup times are given,
//! jobs sharing a machine are additionally sequenced with big-M disjunctions
//! that keep the setup gap between them.

use std::path::PathBuf;
use std::sync::Arc;

use qsched_core::{Assignment, AssignmentEntry, Job, JobId, Machine, MachineId, Time};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{list_schedule, slots_to_assignment, solve_or_fallback, time_limit};
use crate::error::{SchedError, SchedResult};
use crate::milp::{MilpModel, MilpSolution, MilpSolver, Sense, VarId};
use crate::scheduler::{Scheduler, validate_input};

/// Tie-break weight on the sum of completions, so that among makespan-optimal
/// schedules the solver prefers compact ones.
const COMPLETION_WEIGHT: f64 = 1e-3;

/// Largest distance from a whole slot count still read as that count.
const SLOT_TOLERANCE: f64 = 1e-9;

/// First slot a job may start in.
fn release_slot(job: &Job) -> Time {
    job.submission_time.ceil()
}

/// Explicit processing time of a job on a machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTime {
    pub job: JobId,
    pub machine: MachineId,
    pub time: Time,
}

/// Reconfiguration time on `machine` when `to` follows `from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupTime {
    pub from: JobId,
    pub to: JobId,
    pub machine: MachineId,
    pub time: Time,
}

/// Configuration for [`IlpScheduler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IlpConfig {
    /// Solver deadline in seconds, `None` to wait for optimality.
    pub time_limit_secs: Option<f64>,
    /// Processing time per unit of requirement for pairs without a table entry.
    pub time_per_unit: f64,
    /// Per (job, machine) processing times.
    pub processing_times: Vec<ProcessingTime>,
    /// Per (predecessor, successor, machine) setup times.
    pub setup_times: Vec<SetupTime>,
    /// Write the formulated model here in LP format before solving.
    pub lp_export: Option<PathBuf>,
}

impl Default for IlpConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: Some(60.0),
            time_per_unit: 1.0,
            processing_times: Vec::new(),
            setup_times: Vec::new(),
            lp_export: None,
        }
    }
}

impl IlpConfig {
    /// Set the solver deadline.
    pub fn with_time_limit_secs(mut self, secs: Option<f64>) -> Self {
        self.time_limit_secs = secs;
        self
    }

    /// Set the processing time table.
    pub fn with_processing_times(mut self, times: Vec<ProcessingTime>) -> Self {
        self.processing_times = times;
        self
    }

    /// Set the setup time table.
    pub fn with_setup_times(mut self, times: Vec<SetupTime>) -> Self {
        self.setup_times = times;
        self
    }

    /// Export the model to an LP file.
    pub fn with_lp_export(mut self, path: impl Into<PathBuf>) -> Self {
        self.lp_export = Some(path.into());
        self
    }
}

/// ILP scheduler with capacity sharing.
pub struct IlpScheduler {
    config: IlpConfig,
    solver: Arc<dyn MilpSolver>,
}

impl std::fmt::Debug for IlpScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IlpScheduler")
            .field("config", &self.config)
            .field("solver", &self.solver.name())
            .finish()
    }
}

/// Index-based view of the inputs.
struct Instance<'a> {
    jobs: &'a [Job],
    machines: &'a [Machine],
    /// Integer processing slots per valid (job, machine).
    processing: FxHashMap<(usize, usize), u32>,
    setup: FxHashMap<(usize, usize, usize), Time>,
}

impl<'a> Instance<'a> {
    fn new(config: &IlpConfig, jobs: &'a [Job], machines: &'a [Machine]) -> SchedResult<Self> {
        let job_index: FxHashMap<&JobId, usize> =
            jobs.iter().enumerate().map(|(i, j)| (&j.id, i)).collect();
        let machine_index: FxHashMap<&MachineId, usize> =
            machines.iter().enumerate().map(|(i, m)| (&m.id, i)).collect();
        let table: FxHashMap<(&JobId, &MachineId), Time> = config
            .processing_times
            .iter()
            .map(|p| ((&p.job, &p.machine), p.time))
            .collect();

        let mut processing = FxHashMap::default();
        for (j, job) in jobs.iter().enumerate() {
            for (m, machine) in machines.iter().enumerate() {
                if !machine.fits(job.resource_requirement) {
                    continue;
                }
                let time = table.get(&(&job.id, &machine.id)).copied().unwrap_or_else(|| {
                    f64::from(job.resource_requirement) * config.time_per_unit * machine.time_scale
                });
                if !time.is_finite() || time <= 0.0 {
                    return Err(SchedError::InvalidConfig(format!(
                        "processing time of {} on {} must be positive, got {time}",
                        job.id, machine.id
                    )));
                }
                // Time-indexed: a job occupies whole slots.
                if (time - time.round()).abs() > SLOT_TOLERANCE {
                    return Err(SchedError::InvalidConfig(format!(
                        "processing time of {} on {} must be whole slots, got {time}",
                        job.id, machine.id
                    )));
                }
                processing.insert((j, m), time.round() as u32);
            }
        }

        let mut setup = FxHashMap::default();
        for entry in &config.setup_times {
            let (Some(&from), Some(&to), Some(&m)) = (
                job_index.get(&entry.from),
                job_index.get(&entry.to),
                machine_index.get(&entry.machine),
            ) else {
                debug!(
                    "Ignoring setup time {} -> {} on {}: unknown id",
                    entry.from, entry.to, entry.machine
                );
                continue;
            };
            // Starts sit on the slot grid, so a partial setup slot is lost.
            setup.insert((from, to, m), entry.time.max(0.0).ceil());
        }

        Ok(Self {
            jobs,
            machines,
            processing,
            setup,
        })
    }

    fn p(&self, j: usize, m: usize) -> Option<u32> {
        self.processing.get(&(j, m)).copied()
    }

    fn setup(&self, from: usize, to: usize, m: usize) -> Time {
        self.setup.get(&(from, to, m)).copied().unwrap_or(0.0)
    }

    fn sequenced(&self) -> bool {
        !self.setup.is_empty()
    }
}

/// Variable handles of the built model.
struct Formulation {
    model: MilpModel,
    x: FxHashMap<(usize, usize), VarId>,
    start: Vec<VarId>,
}

impl IlpScheduler {
    /// Create a scheduler that solves with `solver`.
    pub fn new(config: IlpConfig, solver: Arc<dyn MilpSolver>) -> Self {
        Self { config, solver }
    }

    /// The active configuration.
    pub fn config(&self) -> &IlpConfig {
        &self.config
    }

    fn formulate(&self, instance: &Instance<'_>, horizon: u32) -> Formulation {
        let jobs = instance.jobs;
        let machines = instance.machines;
        let h = f64::from(horizon);
        let max_setup = instance.setup.values().copied().fold(0.0, f64::max);
        let big_m = h + max_setup;

        let mut model = MilpModel::new("milq");
        let mut x = FxHashMap::default();
        let mut z: FxHashMap<(usize, usize), Vec<VarId>> = FxHashMap::default();
        for (j, job) in jobs.iter().enumerate() {
            for (m, machine) in machines.iter().enumerate() {
                if instance.p(j, m).is_none() {
                    continue;
                }
                x.insert((j, m), model.add_binary(&format!("x_{}_{}", job.id, machine.id)));
                let slots = (0..horizon)
                    .map(|t| model.add_binary(&format!("z_{}_{}_{t}", job.id, machine.id)))
                    .collect();
                z.insert((j, m), slots);
            }
        }
        let start: Vec<VarId> = jobs
            .iter()
            .map(|job| {
                model.add_continuous(&format!("s_{}", job.id), release_slot(job), Some(h))
            })
            .collect();
        let completion: Vec<VarId> = jobs
            .iter()
            .map(|job| model.add_continuous(&format!("c_{}", job.id), 0.0, Some(h)))
            .collect();
        let cmax = model.add_continuous("makespan", 0.0, Some(h));

        for (j, job) in jobs.iter().enumerate() {
            let valid: Vec<usize> = (0..machines.len())
                .filter(|&m| x.contains_key(&(j, m)))
                .collect();

            // Exactly one machine.
            model.add_constraint(
                format!("assign_{}", job.id),
                valid.iter().map(|&m| (x[&(j, m)], 1.0)).collect(),
                Sense::Eq,
                1.0,
            );

            // c = s + p on the chosen machine.
            let mut terms = vec![(completion[j], 1.0), (start[j], -1.0)];
            terms.extend(
                valid
                    .iter()
                    .filter_map(|&m| instance.p(j, m).map(|p| (x[&(j, m)], -f64::from(p)))),
            );
            model.add_constraint(format!("duration_{}", job.id), terms, Sense::Eq, 0.0);

            for &m in &valid {
                let p = f64::from(instance.p(j, m).unwrap_or(0));
                let slots = &z[&(j, m)];

                // Occupies exactly p slots on the chosen machine, none elsewhere.
                let mut terms: Vec<(VarId, f64)> = slots.iter().map(|&v| (v, 1.0)).collect();
                terms.push((x[&(j, m)], -p));
                model.add_constraint(
                    format!("slots_{}_{}", job.id, machines[m].id),
                    terms,
                    Sense::Eq,
                    0.0,
                );

                for (t, &slot) in slots.iter().enumerate() {
                    let t = t as f64;
                    model.add_constraint(
                        format!("link_{}_{}_{t}", job.id, machines[m].id),
                        vec![(slot, 1.0), (x[&(j, m)], -1.0)],
                        Sense::Le,
                        0.0,
                    );
                    // Occupied slot t lies inside [s, c).
                    model.add_constraint(
                        format!("after_{}_{}_{t}", job.id, machines[m].id),
                        vec![(slot, t + 1.0), (completion[j], -1.0)],
                        Sense::Le,
                        0.0,
                    );
                    model.add_constraint(
                        format!("before_{}_{}_{t}", job.id, machines[m].id),
                        vec![(start[j], 1.0), (slot, h)],
                        Sense::Le,
                        t + h,
                    );
                }
            }

            model.add_constraint(
                format!("makespan_{}", job.id),
                vec![(completion[j], 1.0), (cmax, -1.0)],
                Sense::Le,
                0.0,
            );
        }

        // Capacity per machine and slot.
        for (m, machine) in machines.iter().enumerate() {
            for t in 0..horizon as usize {
                let terms: Vec<(VarId, f64)> = (0..jobs.len())
                    .filter_map(|j| {
                        z.get(&(j, m))
                            .map(|slots| (slots[t], f64::from(jobs[j].resource_requirement)))
                    })
                    .collect();
                if terms.is_empty() {
                    continue;
                }
                model.add_constraint(
                    format!("capacity_{}_{t}", machine.id),
                    terms,
                    Sense::Le,
                    f64::from(machine.capacity),
                );
            }
        }

        // Setup-aware sequencing of every pair that can share a machine.
        if instance.sequenced() {
            for (m, machine) in machines.iter().enumerate() {
                for i in 0..jobs.len() {
                    for j in (i + 1)..jobs.len() {
                        let (Some(&xi), Some(&xj)) = (x.get(&(i, m)), x.get(&(j, m))) else {
                            continue;
                        };
                        let order = model.add_binary(&format!(
                            "o_{}_{}_{}",
                            jobs[i].id, jobs[j].id, machine.id
                        ));
                        // order = 1: i before j.
                        model.add_constraint(
                            format!("seq_{}_{}_{}", jobs[i].id, jobs[j].id, machine.id),
                            vec![
                                (start[j], 1.0),
                                (completion[i], -1.0),
                                (order, -big_m),
                                (xi, -big_m),
                                (xj, -big_m),
                            ],
                            Sense::Ge,
                            instance.setup(i, j, m) - 3.0 * big_m,
                        );
                        model.add_constraint(
                            format!("seq_{}_{}_{}", jobs[j].id, jobs[i].id, machine.id),
                            vec![
                                (start[i], 1.0),
                                (completion[j], -1.0),
                                (order, big_m),
                                (xi, -big_m),
                                (xj, -big_m),
                            ],
                            Sense::Ge,
                            instance.setup(j, i, m) - 2.0 * big_m,
                        );
                    }
                }
            }
        }

        let mut objective = vec![(cmax, 1.0)];
        objective.extend(completion.iter().map(|&c| (c, COMPLETION_WEIGHT)));
        model.minimise(objective);

        Formulation { model, x, start }
    }

    fn decode(
        &self,
        instance: &Instance<'_>,
        formulation: &Formulation,
        solution: &MilpSolution,
    ) -> SchedResult<Assignment> {
        let mut assignment = Assignment::new(self.name());
        for (j, job) in instance.jobs.iter().enumerate() {
            let m = (0..instance.machines.len())
                .find(|&m| {
                    formulation
                        .x
                        .get(&(j, m))
                        .is_some_and(|&v| solution.is_set(v))
                })
                .ok_or_else(|| {
                    SchedError::Solver(format!("solution leaves job {} unassigned", job.id))
                })?;
            let p = f64::from(instance.p(j, m).unwrap_or(0));
            let start = solution.value(formulation.start[j]).round();
            assignment.push(AssignmentEntry::new(
                job,
                instance.machines[m].id.clone(),
                start,
                start + p,
            ));
        }
        assignment.sort();
        Ok(assignment)
    }
}

impl Scheduler for IlpScheduler {
    fn name(&self) -> &str {
        "MILQ"
    }

    fn schedule(&self, jobs: &[Job], machines: &[Machine]) -> SchedResult<Assignment> {
        validate_input(jobs, machines)?;
        if jobs.is_empty() {
            return Ok(Assignment::new(self.name()));
        }

        let instance = Instance::new(&self.config, jobs, machines)?;
        let slots = list_schedule(
            jobs,
            machines,
            |j| release_slot(&jobs[j]),
            |j, m| instance.p(j, m).map(f64::from),
            |i, j, m| instance.setup(i, j, m),
        )?;
        let incumbent = slots_to_assignment(self.name(), jobs, machines, &slots);
        let horizon = slots.iter().map(|s| s.end).fold(0.0, f64::max).ceil() as u32;

        let formulation = self.formulate(&instance, horizon);
        info!(
            "MILQ model: {} jobs, {} machines, horizon {}, {} vars, {} constraints",
            jobs.len(),
            machines.len(),
            horizon,
            formulation.model.num_vars(),
            formulation.model.constraints.len()
        );
        if let Some(path) = &self.config.lp_export {
            formulation.model.write_lp(path)?;
        }

        solve_or_fallback(
            self.name(),
            self.solver.as_ref(),
            &formulation.model,
            time_limit(self.config.time_limit_secs)?,
            incumbent,
            |solution| self.decode(&instance, &formulation, solution),
        )
    }
}
