//! MILP-based schedulers.
//!
//! Both formulations first build a feasible list schedule. It bounds the time
//! horizon and the big-M constants, and it is what the scheduler returns
//! (flagged `partial_optimality`) when the solver hits its deadline without an
//! incumbent of its own.

mod decomposed;
mod whole;

pub use decomposed::{IlpConfig, IlpScheduler, ProcessingTime, SetupTime};
pub use whole::{WholeJobIlpConfig, WholeJobIlpScheduler};

use std::time::Duration;

use qsched_core::{Assignment, AssignmentEntry, Job, Machine, Time};
use tracing::{info, warn};

use crate::error::{SchedError, SchedResult};
use crate::milp::{MilpModel, MilpSolution, MilpSolver, SolveOutcome};

/// One placement of the list schedule, by input index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Slot {
    pub job: usize,
    pub machine: usize,
    pub start: Time,
    pub end: Time,
}

/// Sequential list schedule.
///
/// Jobs are taken largest first; each goes to the machine where it would
/// complete earliest, one job at a time per machine, respecting `release`
/// and the setup gap after the machine's previous job. `duration` returns
/// `None` for pairings that are not allowed.
pub(crate) fn list_schedule(
    jobs: &[Job],
    machines: &[Machine],
    release: impl Fn(usize) -> Time,
    duration: impl Fn(usize, usize) -> Option<Time>,
    setup: impl Fn(usize, usize, usize) -> Time,
) -> SchedResult<Vec<Slot>> {
    let mut order: Vec<usize> = (0..jobs.len()).collect();
    order.sort_by(|&a, &b| {
        jobs[b]
            .resource_requirement
            .cmp(&jobs[a].resource_requirement)
            .then_with(|| jobs[a].id.cmp(&jobs[b].id))
    });

    let mut last: Vec<Option<(usize, Time)>> = vec![None; machines.len()];
    let mut slots = Vec::with_capacity(jobs.len());
    for j in order {
        let mut best: Option<Slot> = None;
        for m in 0..machines.len() {
            let Some(p) = duration(j, m) else {
                continue;
            };
            let ready = match last[m] {
                Some((prev, end)) => end + setup(prev, j, m),
                None => 0.0,
            };
            let start = ready.max(release(j));
            let candidate = Slot {
                job: j,
                machine: m,
                start,
                end: start + p,
            };
            if best.is_none_or(|b| candidate.end < b.end) {
                best = Some(candidate);
            }
        }
        let slot = best.ok_or_else(|| SchedError::no_feasible_machine(&jobs[j]))?;
        last[slot.machine] = Some((j, slot.end));
        slots.push(slot);
    }
    Ok(slots)
}

pub(crate) fn slots_to_assignment(
    name: &str,
    jobs: &[Job],
    machines: &[Machine],
    slots: &[Slot],
) -> Assignment {
    let mut assignment = Assignment::new(name);
    for slot in slots {
        assignment.push(AssignmentEntry::new(
            &jobs[slot.job],
            machines[slot.machine].id.clone(),
            slot.start,
            slot.end,
        ));
    }
    assignment.sort();
    assignment
}

/// Run the solver and turn its outcome into an assignment.
pub(crate) fn solve_or_fallback(
    name: &str,
    solver: &dyn MilpSolver,
    model: &MilpModel,
    time_limit: Option<Duration>,
    incumbent: Assignment,
    decode: impl Fn(&MilpSolution) -> SchedResult<Assignment>,
) -> SchedResult<Assignment> {
    let outcome = solver.solve(model, time_limit)?;
    match outcome {
        SolveOutcome::Optimal(solution) => {
            info!(
                "{} solved to optimality by {} (objective {:.3})",
                name,
                solver.name(),
                solution.objective
            );
            decode(&solution)
        }
        SolveOutcome::TimedOut(Some(solution)) => {
            warn!("{} timed out; returning the solver incumbent", name);
            Ok(decode(&solution)?.with_partial_optimality(true))
        }
        SolveOutcome::TimedOut(None) => {
            warn!("{} timed out without a solution; returning the list schedule", name);
            Ok(incumbent.with_partial_optimality(true))
        }
        SolveOutcome::Infeasible => Err(SchedError::InfeasibleSchedule(format!(
            "{} model {} has no feasible solution",
            name, model.name
        ))),
    }
}

pub(crate) fn time_limit(secs: Option<f64>) -> SchedResult<Option<Duration>> {
    secs.map(|s| {
        Duration::try_from_secs_f64(s)
            .map_err(|e| SchedError::InvalidConfig(format!("time limit {s}: {e}")))
    })
    .transpose()
}
