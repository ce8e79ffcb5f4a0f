//! Re-time a planned schedule with measured durations.
//!
//! Jobs keep their machine. Per machine they are replayed in planned-start
//! order, each starting at the earliest instant no earlier than its planned
//! start at which the machine still has room for it over its whole actual
//! duration.

use qsched_core::{Assignment, AssignmentEntry, CoreError, JobId, Machine, Time};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::EvalResult;

/// Intervals already replayed on one machine.
#[derive(Default)]
struct Occupancy {
    intervals: Vec<(Time, Time, u32)>,
}

impl Occupancy {
    fn load_at(&self, t: Time) -> u32 {
        self.intervals
            .iter()
            .filter(|(s, e, _)| *s <= t && t < *e)
            .map(|(_, _, r)| r)
            .sum()
    }

    fn earliest(&self, not_before: Time, duration: Time, requirement: u32, capacity: u32) -> Time {
        let mut candidates: Vec<Time> = std::iter::once(not_before)
            .chain(
                self.intervals
                    .iter()
                    .map(|(_, e, _)| *e)
                    .filter(|e| *e > not_before),
            )
            .collect();
        candidates.sort_by(f64::total_cmp);

        for &t in &candidates {
            let end = t + duration;
            let admits = std::iter::once(t)
                .chain(
                    self.intervals
                        .iter()
                        .map(|(s, _, _)| *s)
                        .filter(|s| *s > t && *s < end),
                )
                .all(|instant| self.load_at(instant) + requirement <= capacity);
            if admits {
                return t;
            }
        }
        candidates.last().copied().unwrap_or(not_before)
    }
}

/// Replay `assignment` with `actual` durations.
///
/// Jobs without a measured duration keep their planned one.
pub fn replay(
    assignment: &Assignment,
    machines: &[Machine],
    actual: &FxHashMap<JobId, Time>,
) -> EvalResult<Assignment> {
    let capacities: FxHashMap<_, _> = machines.iter().map(|m| (&m.id, m.capacity)).collect();

    let mut order: Vec<&AssignmentEntry> = assignment.entries.iter().collect();
    order.sort_by(|a, b| {
        a.start
            .total_cmp(&b.start)
            .then_with(|| a.job.cmp(&b.job))
    });

    let mut occupancy: FxHashMap<_, Occupancy> = FxHashMap::default();
    let mut replayed = Assignment::new(assignment.scheduler.clone())
        .with_partial_optimality(assignment.partial_optimality);

    for entry in order {
        let capacity = capacities
            .get(&entry.machine)
            .copied()
            .ok_or_else(|| CoreError::UnknownMachine(entry.machine.to_string()))?;
        let duration = actual.get(&entry.job).copied().unwrap_or(entry.duration());
        let timeline = occupancy.entry(&entry.machine).or_default();
        let start = timeline.earliest(entry.start, duration, entry.requirement, capacity);
        let end = start + duration;
        timeline.intervals.push((start, end, entry.requirement));

        if start != entry.start || end != entry.end {
            debug!(
                "Replay moved {} on {} from [{}, {}) to [{}, {})",
                entry.job, entry.machine, entry.start, entry.end, start, end
            );
        }
        replayed.push(AssignmentEntry {
            start,
            end,
            ..entry.clone()
        });
    }

    replayed.sort();
    Ok(replayed)
}
