//! Whole-job ILP: no decomposition, one job per machine at a time.
//!
//! Each job is restricted to its valid backends and every valid pairing is
//! pre-scored with an affinity (lower is better) and a duration estimate. The
//! model minimises total weighted completion time plus a weighted affinity
//! penalty, with pairwise big-M disjunctions keeping jobs on the same machine
//! apart.

use std::path::PathBuf;
use std::sync::Arc;

use qsched_core::{Assignment, AssignmentEntry, Job, Machine, Time};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{list_schedule, slots_to_assignment, solve_or_fallback, time_limit};
use crate::affinity::{
    AffinityEntry, AffinityScorer, EtaModel, ScoredMachine, SlackAffinity, TableAffinity,
    score_backends,
};
use crate::error::{SchedError, SchedResult};
use crate::milp::{MilpModel, MilpSolution, MilpSolver, Sense, VarId};
use crate::scheduler::{Scheduler, validate_input};

/// Configuration for [`WholeJobIlpScheduler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WholeJobIlpConfig {
    /// Solver deadline in seconds, `None` to wait for optimality.
    pub time_limit_secs: Option<f64>,
    /// Duration estimate per pairing.
    pub eta: EtaModel,
    /// Weight of the affinity penalty against weighted completion time.
    pub affinity_weight: f64,
    /// External affinity scores; pairs without an entry use slack.
    pub affinities: Vec<AffinityEntry>,
    /// Write the formulated model here in LP format before solving.
    pub lp_export: Option<PathBuf>,
}

impl Default for WholeJobIlpConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: Some(60.0),
            eta: EtaModel::default(),
            affinity_weight: 1.0,
            affinities: Vec::new(),
            lp_export: None,
        }
    }
}

impl WholeJobIlpConfig {
    /// Set the solver deadline.
    pub fn with_time_limit_secs(mut self, secs: Option<f64>) -> Self {
        self.time_limit_secs = secs;
        self
    }

    /// Set the duration estimate.
    pub fn with_eta(mut self, eta: EtaModel) -> Self {
        self.eta = eta;
        self
    }

    /// Set the affinity weight.
    pub fn with_affinity_weight(mut self, weight: f64) -> Self {
        self.affinity_weight = weight;
        self
    }

    /// Export the model to an LP file.
    pub fn with_lp_export(mut self, path: impl Into<PathBuf>) -> Self {
        self.lp_export = Some(path.into());
        self
    }
}

/// ILP scheduler for whole-job placement.
pub struct WholeJobIlpScheduler {
    config: WholeJobIlpConfig,
    solver: Arc<dyn MilpSolver>,
    scorer: Arc<dyn AffinityScorer>,
}

impl std::fmt::Debug for WholeJobIlpScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WholeJobIlpScheduler")
            .field("config", &self.config)
            .field("solver", &self.solver.name())
            .finish_non_exhaustive()
    }
}

struct Formulation {
    model: MilpModel,
    x: FxHashMap<(usize, usize), VarId>,
    start: Vec<VarId>,
}

impl WholeJobIlpScheduler {
    /// Create a scheduler that solves with `solver`.
    ///
    /// Affinities come from the config table, falling back to slack.
    pub fn new(config: WholeJobIlpConfig, solver: Arc<dyn MilpSolver>) -> Self {
        let scorer: Arc<dyn AffinityScorer> = if config.affinities.is_empty() {
            Arc::new(SlackAffinity)
        } else {
            Arc::new(TableAffinity::new(&config.affinities))
        };
        Self {
            config,
            solver,
            scorer,
        }
    }

    /// Replace the affinity scorer.
    pub fn with_scorer(mut self, scorer: Arc<dyn AffinityScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &WholeJobIlpConfig {
        &self.config
    }

    fn formulate(
        &self,
        jobs: &[Job],
        num_machines: usize,
        scores: &[Vec<ScoredMachine>],
        horizon: Time,
    ) -> Formulation {
        // c[i] - s[j] never exceeds twice the horizon.
        let big_m = 2.0 * horizon;
        let mut model = MilpModel::new("notads");
        let mut x = FxHashMap::default();
        for (j, job) in jobs.iter().enumerate() {
            for scored in &scores[j] {
                x.insert(
                    (j, scored.index),
                    model.add_binary(&format!("x_{}_{}", job.id, scored.machine)),
                );
            }
        }
        let start: Vec<VarId> = jobs
            .iter()
            .map(|job| {
                model.add_continuous(&format!("s_{}", job.id), job.submission_time, Some(horizon))
            })
            .collect();
        let completion: Vec<VarId> = jobs
            .iter()
            .map(|job| model.add_continuous(&format!("c_{}", job.id), 0.0, None))
            .collect();

        let mut objective = Vec::new();
        for (j, job) in jobs.iter().enumerate() {
            model.add_constraint(
                format!("assign_{}", job.id),
                scores[j].iter().map(|s| (x[&(j, s.index)], 1.0)).collect(),
                Sense::Eq,
                1.0,
            );

            let mut terms = vec![(completion[j], 1.0), (start[j], -1.0)];
            terms.extend(scores[j].iter().map(|s| (x[&(j, s.index)], -s.eta)));
            model.add_constraint(format!("duration_{}", job.id), terms, Sense::Eq, 0.0);

            objective.push((completion[j], job.weight));
            objective.extend(
                scores[j]
                    .iter()
                    .map(|s| (x[&(j, s.index)], self.config.affinity_weight * s.affinity)),
            );
        }

        // Pairwise non-overlap on every machine two jobs could share.
        for m in 0..num_machines {
            for i in 0..jobs.len() {
                for j in (i + 1)..jobs.len() {
                    let (Some(&xi), Some(&xj)) = (x.get(&(i, m)), x.get(&(j, m))) else {
                        continue;
                    };
                    let order = model.add_binary(&format!("o_{}_{}_{m}", jobs[i].id, jobs[j].id));
                    model.add_constraint(
                        format!("apart_{}_{}_{m}", jobs[i].id, jobs[j].id),
                        vec![
                            (start[j], 1.0),
                            (completion[i], -1.0),
                            (order, -big_m),
                            (xi, -big_m),
                            (xj, -big_m),
                        ],
                        Sense::Ge,
                        -3.0 * big_m,
                    );
                    model.add_constraint(
                        format!("apart_{}_{}_{m}", jobs[j].id, jobs[i].id),
                        vec![
                            (start[i], 1.0),
                            (completion[j], -1.0),
                            (order, big_m),
                            (xi, -big_m),
                            (xj, -big_m),
                        ],
                        Sense::Ge,
                        -2.0 * big_m,
                    );
                }
            }
        }

        model.minimise(objective);
        Formulation { model, x, start }
    }

    /// Read the machine choice and job order off the solution, then left-shift
    /// every job on its machine to remove solver slack.
    fn decode(
        &self,
        jobs: &[Job],
        machines: &[Machine],
        scores: &[Vec<ScoredMachine>],
        formulation: &Formulation,
        solution: &MilpSolution,
    ) -> SchedResult<Assignment> {
        let mut per_machine: Vec<Vec<(Time, usize, Time)>> = vec![Vec::new(); machines.len()];
        for (j, job) in jobs.iter().enumerate() {
            let chosen = scores[j]
                .iter()
                .find(|s| solution.is_set(formulation.x[&(j, s.index)]))
                .ok_or_else(|| {
                    SchedError::Solver(format!("solution leaves job {} unassigned", job.id))
                })?;
            per_machine[chosen.index].push((solution.value(formulation.start[j]), j, chosen.eta));
        }

        let mut assignment = Assignment::new(self.name());
        for (m, queue) in per_machine.iter_mut().enumerate() {
            queue.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| jobs[a.1].id.cmp(&jobs[b.1].id)));
            let mut free = 0.0_f64;
            for &(_, j, eta) in queue.iter() {
                let start = free.max(jobs[j].submission_time);
                let end = start + eta;
                assignment.push(AssignmentEntry::new(&jobs[j], machines[m].id.clone(), start, end));
                free = end;
            }
        }
        assignment.sort();
        Ok(assignment)
    }
}

impl Scheduler for WholeJobIlpScheduler {
    fn name(&self) -> &str {
        "NoTaDS"
    }

    fn schedule(&self, jobs: &[Job], machines: &[Machine]) -> SchedResult<Assignment> {
        validate_input(jobs, machines)?;
        if jobs.is_empty() {
            return Ok(Assignment::new(self.name()));
        }

        let scores: Vec<Vec<ScoredMachine>> = jobs
            .iter()
            .map(|job| score_backends(job, machines, &self.scorer, &self.config.eta))
            .collect();
        for (job, scored) in jobs.iter().zip(&scores) {
            if let Some(bad) = scored.iter().find(|s| !s.eta.is_finite() || s.eta <= 0.0) {
                return Err(SchedError::InvalidConfig(format!(
                    "estimated duration of {} on {} must be positive, got {}",
                    job.id, bad.machine, bad.eta
                )));
            }
        }

        let eta: FxHashMap<(usize, usize), Time> = scores
            .iter()
            .enumerate()
            .flat_map(|(j, scored)| scored.iter().map(move |s| ((j, s.index), s.eta)))
            .collect();
        let slots = list_schedule(
            jobs,
            machines,
            |j| jobs[j].submission_time,
            |j, m| eta.get(&(j, m)).copied(),
            |_, _, _| 0.0,
        )?;
        let incumbent = slots_to_assignment(self.name(), jobs, machines, &slots);

        // Any left-shifted schedule starts every job by the last release plus
        // the sum of the longest estimates.
        let latest_release = jobs.iter().map(|j| j.submission_time).fold(0.0, f64::max);
        let longest: Time = scores
            .iter()
            .map(|s| s.iter().map(|m| m.eta).fold(0.0, f64::max))
            .sum();
        let horizon = latest_release + longest;

        let formulation = self.formulate(jobs, machines.len(), &scores, horizon);
        info!(
            "NoTaDS model: {} jobs, {} machines, {} vars, {} constraints",
            jobs.len(),
            machines.len(),
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
            |solution| self.decode(jobs, machines, &scores, &formulation, solution),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milp::{MicroLpSolver, SolveOutcome};
    use qsched_core::{JobId, MachineId};
    use std::time::Duration;

    fn scheduler(config: WholeJobIlpConfig) -> WholeJobIlpScheduler {
        WholeJobIlpScheduler::new(config, Arc::new(MicroLpSolver::new()))
    }

    struct InfeasibleSolver;

    impl MilpSolver for InfeasibleSolver {
        fn name(&self) -> &str {
            "infeasible"
        }

        fn solve(&self, _: &MilpModel, _: Option<Duration>) -> SchedResult<SolveOutcome> {
            Ok(SolveOutcome::Infeasible)
        }
    }

    #[test]
    fn test_jobs_spread_over_machines() {
        let jobs = vec![Job::new("a", 4).unwrap(), Job::new("b", 3).unwrap()];
        let machines = vec![Machine::new("m0", 5).unwrap(), Machine::new("m1", 5).unwrap()];
        let assignment = scheduler(WholeJobIlpConfig::default())
            .schedule(&jobs, &machines)
            .unwrap();

        assignment.validate(&jobs, &machines).unwrap();
        assert!(!assignment.has_machine_overlap());
        assert!(assignment.entries.iter().all(|e| e.start == 0.0));
        assert_eq!(assignment.makespan(), 4.0);
    }

    #[test]
    fn test_single_machine_has_no_overlap() {
        let jobs = vec![
            Job::new("a", 2).unwrap(),
            Job::new("b", 2).unwrap(),
            Job::new("c", 1).unwrap(),
        ];
        let machines = vec![Machine::new("m", 5).unwrap()];
        let assignment = scheduler(WholeJobIlpConfig::default())
            .schedule(&jobs, &machines)
            .unwrap();

        assignment.validate(&jobs, &machines).unwrap();
        assert!(!assignment.has_machine_overlap());
        // Shortest first minimises total completion time.
        assert_eq!(assignment.get(&JobId::new("c")).unwrap().start, 0.0);
        assert_eq!(assignment.makespan(), 5.0);
    }

    #[test]
    fn test_affinity_steers_placement() {
        let jobs = vec![Job::new("a", 2).unwrap()];
        let machines = vec![Machine::new("m0", 5).unwrap(), Machine::new("m1", 5).unwrap()];
        let config = WholeJobIlpConfig {
            affinities: vec![
                AffinityEntry {
                    job: JobId::new("a"),
                    machine: MachineId::new("m0"),
                    score: 0.9,
                },
                AffinityEntry {
                    job: JobId::new("a"),
                    machine: MachineId::new("m1"),
                    score: 0.1,
                },
            ],
            ..Default::default()
        };
        let assignment = scheduler(config).schedule(&jobs, &machines).unwrap();
        assert_eq!(assignment.entries[0].machine.as_str(), "m1");
    }

    #[test]
    fn test_infeasible_is_an_error() {
        let jobs = vec![Job::new("a", 2).unwrap()];
        let machines = vec![Machine::new("m", 5).unwrap()];
        let scheduler =
            WholeJobIlpScheduler::new(WholeJobIlpConfig::default(), Arc::new(InfeasibleSolver));
        let err = scheduler.schedule(&jobs, &machines).unwrap_err();
        assert!(matches!(err, SchedError::InfeasibleSchedule(_)));
    }

    #[test]
    fn test_eta_drives_duration() {
        let jobs = vec![Job::new("a", 2).unwrap().with_depth(7)];
        let machines = vec![Machine::new("m", 5).unwrap().with_time_scale(2.0)];
        let assignment = scheduler(WholeJobIlpConfig::default())
            .schedule(&jobs, &machines)
            .unwrap();
        assert_eq!(assignment.entries[0].duration(), 14.0);
    }
}
