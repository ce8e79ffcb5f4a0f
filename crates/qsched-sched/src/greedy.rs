//! Capacity-sorted greedy heuristic (first-fit decreasing).
//!
//! Jobs are taken largest first. Each job goes to the machine where it can
//! start earliest; ties go to the lowest machine id. With
//! [`Occupancy::Single`] a machine runs one job at a time on its full
//! capacity, so only a "next free" time per machine is tracked. With
//! [`Occupancy::Shared`] concurrent jobs may share a machine as long as their
//! summed requirement stays within capacity.

use qsched_core::{Assignment, AssignmentEntry, Job, Machine, Time};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SchedError, SchedResult};
use crate::scheduler::{Scheduler, unit_duration, validate_input};

/// How jobs share a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occupancy {
    /// One job per machine at a time.
    #[default]
    Single,
    /// Concurrent jobs share capacity.
    Shared,
}

/// Configuration for [`GreedyScheduler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreedyConfig {
    /// Processing time per unit of resource requirement.
    pub time_per_unit: f64,
    /// Machine sharing policy.
    pub occupancy: Occupancy,
}

impl Default for GreedyConfig {
    fn default() -> Self {
        Self {
            time_per_unit: 1.0,
            occupancy: Occupancy::Single,
        }
    }
}

impl GreedyConfig {
    /// Set the processing time per resource unit.
    pub fn with_time_per_unit(mut self, time_per_unit: f64) -> Self {
        self.time_per_unit = time_per_unit;
        self
    }

    /// Set the occupancy policy.
    pub fn with_occupancy(mut self, occupancy: Occupancy) -> Self {
        self.occupancy = occupancy;
        self
    }
}

/// First-fit-decreasing scheduler.
#[derive(Debug, Clone, Default)]
pub struct GreedyScheduler {
    config: GreedyConfig,
}

/// Busy intervals on one machine.
#[derive(Debug, Default)]
struct Timeline {
    next_free: Time,
    intervals: Vec<(Time, Time, u32)>,
}

impl Timeline {
    fn load_at(&self, t: Time) -> u32 {
        self.intervals
            .iter()
            .filter(|(s, e, _)| *s <= t && t < *e)
            .map(|(_, _, r)| r)
            .sum()
    }

    /// Earliest start `>= release` at which `requirement` fits for
    /// `duration` alongside the existing intervals.
    fn earliest_shared(
        &self,
        release: Time,
        duration: Time,
        requirement: u32,
        capacity: u32,
    ) -> Time {
        let mut candidates: Vec<Time> = std::iter::once(release)
            .chain(self.intervals.iter().map(|(_, e, _)| *e).filter(|e| *e > release))
            .collect();
        candidates.sort_by(f64::total_cmp);

        for t in &candidates {
            let end = t + duration;
            // Load only rises at interval starts, so probing t and every start
            // inside the window covers the maximum.
            let fits = std::iter::once(*t)
                .chain(
                    self.intervals
                        .iter()
                        .map(|(s, _, _)| *s)
                        .filter(|s| *s > *t && *s < end),
                )
                .all(|instant| self.load_at(instant) + requirement <= capacity);
            if fits {
                return *t;
            }
        }
        // After the last interval ends the machine is empty.
        candidates.last().copied().unwrap_or(release)
    }
}

impl GreedyScheduler {
    /// Create a scheduler with the given configuration.
    pub fn new(config: GreedyConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &GreedyConfig {
        &self.config
    }
}

impl Scheduler for GreedyScheduler {
    fn name(&self) -> &str {
        "FFD"
    }

    fn schedule(&self, jobs: &[Job], machines: &[Machine]) -> SchedResult<Assignment> {
        validate_input(jobs, machines)?;

        let mut order: Vec<&Job> = jobs.iter().collect();
        order.sort_by(|a, b| {
            b.resource_requirement
                .cmp(&a.resource_requirement)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut timelines: Vec<Timeline> = machines.iter().map(|_| Timeline::default()).collect();
        let mut assignment = Assignment::new(self.name());

        for job in order {
            let duration = unit_duration(job, self.config.time_per_unit);

            let mut best: Option<(Time, usize)> = None;
            for (index, machine) in machines.iter().enumerate() {
                if !machine.fits(job.resource_requirement) {
                    continue;
                }
                let timeline = &timelines[index];
                let start = match self.config.occupancy {
                    Occupancy::Single => timeline.next_free.max(job.submission_time),
                    Occupancy::Shared => timeline.earliest_shared(
                        job.submission_time,
                        duration,
                        job.resource_requirement,
                        machine.capacity,
                    ),
                };
                let better = match best {
                    None => true,
                    Some((best_start, best_index)) => {
                        start < best_start
                            || (start == best_start && machine.id < machines[best_index].id)
                    }
                };
                if better {
                    best = Some((start, index));
                }
            }

            let (start, index) = best.ok_or_else(|| SchedError::no_feasible_machine(job))?;
            let end = start + duration;
            let timeline = &mut timelines[index];
            timeline.next_free = timeline.next_free.max(end);
            timeline.intervals.push((start, end, job.resource_requirement));

            debug!(
                "Placed job {} ({}) on {} at [{}, {})",
                job.id, job.resource_requirement, machines[index].id, start, end
            );
            assignment.push(AssignmentEntry::new(job, machines[index].id.clone(), start, end));
        }

        info!(
            "FFD scheduled {} job(s) on {} machine(s), makespan {}",
            assignment.len(),
            machines.len(),
            assignment.makespan()
        );
        Ok(assignment)
    }
}
