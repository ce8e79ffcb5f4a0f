//! Metrics Engine: schedule statistics over the leaf jobs of an arena.
//!
//! Parents produced by decomposition are never scheduled themselves, so every
//! time-based statistic aggregates over leaves only. Parents contribute their
//! sampling overhead.

use std::collections::BTreeMap;

use qsched_core::{CoreError, JobArena, Machine, MachineId, Time};
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult};

/// Observation window used to normalise per-machine utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationWindow {
    /// The global makespan, identical for every machine.
    #[default]
    Global,
    /// From the global earliest start to the machine's own last end.
    PerMachine,
}

/// How per-parent decomposition overheads are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverheadAggregation {
    #[default]
    Sum,
    Mean,
}

/// Metrics configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Utilization window.
    pub window: UtilizationWindow,
    /// Overhead aggregation.
    pub overhead: OverheadAggregation,
    /// Fail when a leaf job has no execution result. When false, such jobs
    /// are left out of the fidelity mean.
    pub require_results: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window: UtilizationWindow::Global,
            overhead: OverheadAggregation::Sum,
            require_results: true,
        }
    }
}

impl MetricsConfig {
    /// Set the utilization window.
    pub fn with_window(mut self, window: UtilizationWindow) -> Self {
        self.window = window;
        self
    }

    /// Set the overhead aggregation.
    pub fn with_overhead(mut self, overhead: OverheadAggregation) -> Self {
        self.overhead = overhead;
        self
    }

    /// Require (or not) an execution result on every leaf.
    pub fn with_require_results(mut self, require: bool) -> Self {
        self.require_results = require;
        self
    }
}

/// Utilization of one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineUtilization {
    pub machine: MachineId,
    pub capacity: u32,
    /// Number of leaf jobs hosted.
    pub jobs: usize,
    /// Sum of `requirement x duration` over hosted jobs.
    pub busy: f64,
    /// Observation window the busy time was normalised by.
    pub window: Time,
    /// `busy / (capacity x window)`, 0 for an empty window.
    pub utilization: f64,
}

/// Summary statistics of a completed schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMetrics {
    /// Number of leaf jobs.
    pub num_jobs: usize,
    pub makespan: Time,
    pub average_turnaround_time: Time,
    pub average_response_time: Time,
    /// Per machine, in input order, including machines that hosted nothing.
    pub utilization: Vec<MachineUtilization>,
    /// Mean utilization over machines that hosted at least one job.
    pub average_utilization: f64,
    /// Leaf jobs per unit time, 0 when the makespan is 0.
    pub throughput: f64,
    /// Mean result quality over leaves that have one, 0 when none do.
    pub average_fidelity: f64,
    /// Aggregated decomposition overhead, 0 without decomposition.
    pub sampling_overhead: f64,
    /// `1 - var(u) / (mean(u)^2 + 1e-10)` over hosted machines.
    pub load_balance_score: f64,
}

/// Compute schedule metrics.
///
/// Fails with [`EvalError::IncompleteAssignment`] when a leaf has no
/// placement, or no result while `require_results` is set.
pub fn compute_metrics(
    arena: &JobArena,
    machines: &[Machine],
    config: &MetricsConfig,
) -> EvalResult<ScheduleMetrics> {
    struct Row<'a> {
        machine: &'a MachineId,
        requirement: u32,
        submission: Time,
        start: Time,
        end: Time,
        quality: Option<f64>,
    }

    let mut rows = Vec::new();
    for job in arena.leaves() {
        let placement = job
            .placement
            .as_ref()
            .ok_or_else(|| EvalError::incomplete(&job.id, "placement"))?;
        if config.require_results && job.result_quality.is_none() {
            return Err(EvalError::incomplete(&job.id, "execution result"));
        }
        rows.push(Row {
            machine: &placement.machine,
            requirement: job.resource_requirement,
            submission: job.submission_time,
            start: placement.start,
            end: placement.end,
            quality: job.result_quality,
        });
    }

    let num_jobs = rows.len();
    let first_start = rows.iter().map(|r| r.start).reduce(f64::min).unwrap_or(0.0);
    let last_end = rows.iter().map(|r| r.end).reduce(f64::max).unwrap_or(0.0);
    let makespan = last_end - first_start;

    let mean = |values: &[f64]| {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    };

    let turnarounds: Vec<f64> = rows.iter().map(|r| r.end - r.submission).collect();
    let responses: Vec<f64> = rows.iter().map(|r| r.start - r.submission).collect();
    let qualities: Vec<f64> = rows.iter().filter_map(|r| r.quality).collect();

    // busy, last end, job count
    let mut per_machine: BTreeMap<&MachineId, (f64, Time, usize)> = BTreeMap::new();
    for row in &rows {
        if !machines.iter().any(|m| &m.id == row.machine) {
            return Err(CoreError::UnknownMachine(row.machine.to_string()).into());
        }
        let slot = per_machine.entry(row.machine).or_insert((0.0, first_start, 0));
        slot.0 += f64::from(row.requirement) * (row.end - row.start);
        slot.1 = slot.1.max(row.end);
        slot.2 += 1;
    }

    let utilization: Vec<MachineUtilization> = machines
        .iter()
        .map(|machine| {
            let (busy, machine_end, jobs) = per_machine
                .get(&machine.id)
                .copied()
                .unwrap_or((0.0, first_start, 0));
            let window = match config.window {
                UtilizationWindow::Global => makespan,
                UtilizationWindow::PerMachine => machine_end - first_start,
            };
            let utilization = if window > 0.0 {
                busy / (f64::from(machine.capacity) * window)
            } else {
                0.0
            };
            MachineUtilization {
                machine: machine.id.clone(),
                capacity: machine.capacity,
                jobs,
                busy,
                window,
                utilization,
            }
        })
        .collect();

    let hosted: Vec<f64> = utilization
        .iter()
        .filter(|u| u.jobs > 0)
        .map(|u| u.utilization)
        .collect();
    let average_utilization = mean(&hosted);
    let load_balance_score = if hosted.is_empty() {
        0.0
    } else {
        let variance = hosted
            .iter()
            .map(|u| (u - average_utilization).powi(2))
            .sum::<f64>()
            / hosted.len() as f64;
        1.0 - variance / (average_utilization.powi(2) + 1e-10)
    };

    let overheads: Vec<f64> = arena.decomposed().filter_map(|job| job.overhead).collect();
    let sampling_overhead = match config.overhead {
        OverheadAggregation::Sum => overheads.iter().sum(),
        OverheadAggregation::Mean => mean(&overheads),
    };

    Ok(ScheduleMetrics {
        num_jobs,
        makespan,
        average_turnaround_time: mean(&turnarounds),
        average_response_time: mean(&responses),
        utilization,
        average_utilization,
        throughput: if makespan > 0.0 {
            num_jobs as f64 / makespan
        } else {
            0.0
        },
        average_fidelity: mean(&qualities),
        sampling_overhead,
        load_balance_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use qsched_core::{Assignment, AssignmentEntry, Decomposer, Job, LinearOverhead};

    fn machine(id: &str, capacity: u32) -> Machine {
        Machine::new(id, capacity).unwrap()
    }

    fn scheduled(jobs: Vec<Job>, slots: &[(&str, &str, Time, Time)]) -> JobArena {
        let mut arena = JobArena::from_jobs(jobs).unwrap();
        let mut assignment = Assignment::new("test");
        for (job, machine, start, end) in slots {
            let job = arena.get(&(*job).into()).unwrap().clone();
            assignment.push(AssignmentEntry::new(&job, *machine, *start, *end));
        }
        arena.apply_assignment(&assignment).unwrap();
        arena
    }

    fn record_all(arena: &mut JobArena, quality: f64) {
        let ids: Vec<_> = arena.leaves().map(|j| j.id.clone()).collect();
        for id in ids {
            arena.record_result(&id, quality).unwrap();
        }
    }

    #[test]
    fn test_empty_schedule_is_all_zero() {
        let metrics = compute_metrics(
            &JobArena::new(),
            &[machine("m0", 5)],
            &MetricsConfig::default(),
        )
        .unwrap();
        assert_eq!(metrics.num_jobs, 0);
        assert_eq!(metrics.makespan, 0.0);
        assert_eq!(metrics.throughput, 0.0);
        assert_eq!(metrics.average_utilization, 0.0);
        assert!(!metrics.throughput.is_nan());
    }

    #[test]
    fn test_exact_fit_has_full_utilization() {
        let mut arena = scheduled(vec![Job::new("j", 5).unwrap()], &[("j", "m0", 0.0, 5.0)]);
        record_all(&mut arena, 0.9);

        let metrics =
            compute_metrics(&arena, &[machine("m0", 5)], &MetricsConfig::default()).unwrap();
        assert_eq!(metrics.makespan, 5.0);
        assert_eq!(metrics.utilization[0].utilization, 1.0);
        assert_eq!(metrics.average_utilization, 1.0);
        assert_eq!(metrics.throughput, 0.2);
        assert_eq!(metrics.average_fidelity, 0.9);
        assert_eq!(metrics.load_balance_score, 1.0);
    }

    #[test]
    fn test_turnaround_and_response() {
        let jobs = vec![
            Job::new("a", 4).unwrap(),
            Job::new("b", 3).unwrap().with_submission_time(1.0),
        ];
        let mut arena = scheduled(jobs, &[("a", "m0", 0.0, 4.0), ("b", "m1", 2.0, 5.0)]);
        record_all(&mut arena, 1.0);

        let machines = [machine("m0", 5), machine("m1", 5), machine("idle", 5)];
        let metrics = compute_metrics(&arena, &machines, &MetricsConfig::default()).unwrap();
        assert_eq!(metrics.makespan, 5.0);
        assert_eq!(metrics.average_turnaround_time, 4.0);
        assert_eq!(metrics.average_response_time, 0.5);

        // The idle machine is reported but does not drag the mean down.
        assert_eq!(metrics.utilization.len(), 3);
        assert_eq!(metrics.utilization[2].jobs, 0);
        let expected = (16.0 / 25.0 + 9.0 / 25.0) / 2.0;
        assert!((metrics.average_utilization - expected).abs() < 1e-12);
    }

    #[test]
    fn test_per_machine_window() {
        let jobs = vec![Job::new("a", 2).unwrap(), Job::new("b", 2).unwrap()];
        let mut arena = scheduled(jobs, &[("a", "m0", 0.0, 2.0), ("b", "m1", 0.0, 8.0)]);
        record_all(&mut arena, 1.0);
        let machines = [machine("m0", 2), machine("m1", 2)];

        let global = compute_metrics(&arena, &machines, &MetricsConfig::default()).unwrap();
        assert_eq!(global.utilization[0].utilization, 0.25);

        let config = MetricsConfig::default().with_window(UtilizationWindow::PerMachine);
        let local = compute_metrics(&arena, &machines, &config).unwrap();
        assert_eq!(local.utilization[0].window, 2.0);
        assert_eq!(local.utilization[0].utilization, 1.0);
        assert_eq!(local.utilization[1].utilization, 1.0);
    }

    #[test]
    fn test_missing_placement_is_incomplete() {
        let arena = JobArena::from_jobs([Job::new("j", 1).unwrap()]).unwrap();
        let err =
            compute_metrics(&arena, &[machine("m0", 5)], &MetricsConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            EvalError::IncompleteAssignment { missing: "placement", .. }
        ));
    }

    #[test]
    fn test_missing_result_strict_and_lenient() {
        let jobs = vec![Job::new("a", 1).unwrap(), Job::new("b", 1).unwrap()];
        let mut arena = scheduled(jobs, &[("a", "m0", 0.0, 1.0), ("b", "m0", 1.0, 2.0)]);
        arena.record_result(&"a".into(), 0.8).unwrap();
        let machines = [machine("m0", 1)];

        assert!(compute_metrics(&arena, &machines, &MetricsConfig::default()).is_err());

        let lenient = MetricsConfig::default().with_require_results(false);
        let metrics = compute_metrics(&arena, &machines, &lenient).unwrap();
        assert_eq!(metrics.average_fidelity, 0.8);
    }

    #[test]
    fn test_overhead_aggregation() {
        let mut arena = JobArena::from_jobs([
            Job::new("x", 12).unwrap(),
            Job::new("y", 8).unwrap(),
        ])
        .unwrap();
        arena
            .decompose_oversized(5, &Decomposer::new(LinearOverhead { per_cut: 1.0 }))
            .unwrap();

        let mut assignment = Assignment::new("test");
        let mut t = 0.0;
        for leaf in arena.leaf_jobs() {
            let end = t + f64::from(leaf.resource_requirement);
            assignment.push(AssignmentEntry::new(&leaf, "m0", t, end));
            t = end;
        }
        arena.apply_assignment(&assignment).unwrap();
        record_all(&mut arena, 1.0);
        let machines = [machine("m0", 5)];

        let sum = compute_metrics(&arena, &machines, &MetricsConfig::default()).unwrap();
        assert_eq!(sum.num_jobs, 5);
        assert_eq!(sum.sampling_overhead, 3.0);

        let config = MetricsConfig::default().with_overhead(OverheadAggregation::Mean);
        let mean = compute_metrics(&arena, &machines, &config).unwrap();
        assert_eq!(mean.sampling_overhead, 1.5);
    }

    #[test]
    fn test_unknown_machine_is_rejected() {
        let mut arena =
            scheduled(vec![Job::new("j", 1).unwrap()], &[("j", "ghost", 0.0, 1.0)]);
        record_all(&mut arena, 1.0);
        let err =
            compute_metrics(&arena, &[machine("m0", 5)], &MetricsConfig::default()).unwrap_err();
        assert!(matches!(err, EvalError::Core(CoreError::UnknownMachine(_))));
    }
}
