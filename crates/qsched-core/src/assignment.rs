//! Scheduler output: a time-indexed assignment of jobs to machines.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::job::{Job, JobId, Machine, MachineId, Placement, Time};

/// One scheduled job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentEntry {
    /// The scheduled job.
    pub job: JobId,
    /// Resource requirement of the job (copied for capacity checks).
    pub requirement: u32,
    /// Machine the job runs on.
    pub machine: MachineId,
    /// Start time (inclusive).
    pub start: Time,
    /// End time (exclusive).
    pub end: Time,
}

impl AssignmentEntry {
    /// Create a new entry.
    pub fn new(job: &Job, machine: impl Into<MachineId>, start: Time, end: Time) -> Self {
        Self {
            job: job.id.clone(),
            requirement: job.resource_requirement,
            machine: machine.into(),
            start,
            end,
        }
    }

    /// Length of the entry window.
    pub fn duration(&self) -> Time {
        self.end - self.start
    }

    /// The entry as a [`Placement`].
    pub fn placement(&self) -> Placement {
        Placement::new(self.machine.clone(), self.start, self.end)
    }

    /// Check whether two entries' half-open windows intersect.
    pub fn overlaps(&self, other: &AssignmentEntry) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A complete schedule produced by one scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Name of the scheduler that produced this assignment.
    pub scheduler: String,

    /// Scheduled jobs.
    pub entries: Vec<AssignmentEntry>,

    /// Set when an optimizing scheduler returned a best-effort schedule.
    pub partial_optimality: bool,
}

impl Assignment {
    /// Create an empty assignment.
    pub fn new(scheduler: impl Into<String>) -> Self {
        Self {
            scheduler: scheduler.into(),
            entries: Vec::new(),
            partial_optimality: false,
        }
    }

    /// Add an entry.
    pub fn push(&mut self, entry: AssignmentEntry) {
        self.entries.push(entry);
    }

    /// Flag the assignment as feasible but not proven optimal.
    pub fn with_partial_optimality(mut self, partial: bool) -> Self {
        self.partial_optimality = partial;
        self
    }

    /// Number of scheduled jobs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was scheduled.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the entry for a job.
    pub fn get(&self, job: &JobId) -> Option<&AssignmentEntry> {
        self.entries.iter().find(|e| &e.job == job)
    }

    /// Entries grouped by machine, each group sorted by start time then job id.
    pub fn by_machine(&self) -> FxHashMap<MachineId, Vec<&AssignmentEntry>> {
        let mut groups: FxHashMap<MachineId, Vec<&AssignmentEntry>> = FxHashMap::default();
        for entry in &self.entries {
            groups.entry(entry.machine.clone()).or_default().push(entry);
        }
        for group in groups.values_mut() {
            group.sort_by(|a, b| a.start.total_cmp(&b.start).then_with(|| a.job.cmp(&b.job)));
        }
        groups
    }

    /// Sort entries by start time, then machine, then job id.
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            a.start
                .total_cmp(&b.start)
                .then_with(|| a.machine.cmp(&b.machine))
                .then_with(|| a.job.cmp(&b.job))
        });
    }

    /// `max(end) - min(start)` over all entries, 0 when empty.
    pub fn makespan(&self) -> Time {
        let start = self.entries.iter().map(|e| e.start).reduce(f64::min);
        let end = self.entries.iter().map(|e| e.end).reduce(f64::max);
        match (start, end) {
            (Some(s), Some(e)) => e - s,
            _ => 0.0,
        }
    }

    /// Peak concurrent resource use on a machine.
    pub fn peak_load(&self, machine: &MachineId) -> u32 {
        let on_machine: Vec<&AssignmentEntry> = self
            .entries
            .iter()
            .filter(|e| &e.machine == machine)
            .collect();

        // The load is piecewise constant and only rises at a start point.
        on_machine
            .iter()
            .map(|at| {
                on_machine
                    .iter()
                    .filter(|e| e.start <= at.start && at.start < e.end)
                    .map(|e| e.requirement)
                    .sum::<u32>()
            })
            .max()
            .unwrap_or(0)
    }

    /// Whether any two entries on the same machine overlap in time.
    pub fn has_machine_overlap(&self) -> bool {
        self.by_machine().values().any(|group| {
            group
                .windows(2)
                .any(|pair| pair[0].end > pair[1].start)
        })
    }

    /// Check the assignment against its inputs.
    ///
    /// Verifies that every job appears exactly once, every machine exists,
    /// windows are well-formed, and no machine exceeds its capacity at any
    /// instant.
    pub fn validate(&self, jobs: &[Job], machines: &[Machine]) -> CoreResult<()> {
        let capacities: FxHashMap<&MachineId, u32> =
            machines.iter().map(|m| (&m.id, m.capacity)).collect();
        let expected: FxHashSet<&JobId> = jobs.iter().map(|j| &j.id).collect();

        let mut seen: FxHashSet<&JobId> = FxHashSet::default();
        for entry in &self.entries {
            if !expected.contains(&entry.job) {
                return Err(CoreError::UnknownJob(entry.job.to_string()));
            }
            if !seen.insert(&entry.job) {
                return Err(CoreError::Internal(format!(
                    "job {} scheduled more than once",
                    entry.job
                )));
            }
            let capacity = capacities
                .get(&entry.machine)
                .copied()
                .ok_or_else(|| CoreError::UnknownMachine(entry.machine.to_string()))?;
            if entry.requirement > capacity {
                return Err(CoreError::Internal(format!(
                    "job {} needs {} but {} offers {}",
                    entry.job, entry.requirement, entry.machine, capacity
                )));
            }
            if entry.end <= entry.start {
                return Err(CoreError::Internal(format!(
                    "job {} has empty window [{}, {})",
                    entry.job, entry.start, entry.end
                )));
            }
        }

        if let Some(missing) = expected.iter().find(|id| !seen.contains(*id)) {
            return Err(CoreError::Internal(format!("job {missing} was not scheduled")));
        }

        for machine in machines {
            let peak = self.peak_load(&machine.id);
            if peak > machine.capacity {
                return Err(CoreError::Internal(format!(
                    "machine {} overloaded: peak {} > capacity {}",
                    machine.id, peak, machine.capacity
                )));
            }
        }

        Ok(())
    }
}
