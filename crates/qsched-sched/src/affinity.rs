//! Job-to-machine pre-scoring for the whole-job ILP.
//!
//! Each job is restricted to its valid backends (machines large enough to
//! host it whole). Every valid pairing then gets an affinity score (lower is a
//! better fit) and a duration estimate ("eta").

use std::sync::Arc;

use qsched_core::{Job, JobId, Machine, MachineId, Time};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Scores how well a job fits a machine. Lower is better.
pub trait AffinityScorer: Send + Sync {
    /// Affinity of `job` on `machine`. Only called for valid pairings.
    fn score(&self, job: &Job, machine: &Machine) -> f64;
}

/// Fraction of the machine left idle: `(capacity - requirement) / capacity`.
///
/// Prefers the tightest machine, leaving large machines for large jobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlackAffinity;

impl AffinityScorer for SlackAffinity {
    fn score(&self, job: &Job, machine: &Machine) -> f64 {
        let capacity = f64::from(machine.capacity);
        (capacity - f64::from(job.resource_requirement)) / capacity
    }
}

/// One externally computed affinity (e.g. a layout score).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffinityEntry {
    pub job: JobId,
    pub machine: MachineId,
    pub score: f64,
}

/// Scores looked up from a table, with [`SlackAffinity`] for missing pairs.
#[derive(Debug, Clone, Default)]
pub struct TableAffinity {
    table: FxHashMap<(JobId, MachineId), f64>,
}

impl TableAffinity {
    /// Build from table entries. Later duplicates win.
    pub fn new(entries: &[AffinityEntry]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|e| ((e.job.clone(), e.machine.clone()), e.score))
                .collect(),
        }
    }
}

impl AffinityScorer for TableAffinity {
    fn score(&self, job: &Job, machine: &Machine) -> f64 {
        self.table
            .get(&(job.id.clone(), machine.id.clone()))
            .copied()
            .unwrap_or_else(|| SlackAffinity.score(job, machine))
    }
}

/// Duration estimate from structural depth and per-layer timing.
///
/// `eta = (depth_weight * depth * layer_time + readout_time) * time_scale`,
/// where `depth` falls back to the resource requirement when the job carries
/// none. The defaults make `eta` equal to the requirement on a nominal
/// machine, matching the heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtaModel {
    /// Weight applied to the structural depth.
    pub depth_weight: f64,
    /// Time per circuit layer.
    pub layer_time: f64,
    /// Fixed readout time per execution.
    pub readout_time: f64,
}

impl Default for EtaModel {
    fn default() -> Self {
        Self {
            depth_weight: 1.0,
            layer_time: 1.0,
            readout_time: 0.0,
        }
    }
}

impl EtaModel {
    /// Estimated duration of `job` on `machine`.
    pub fn estimate(&self, job: &Job, machine: &Machine) -> Time {
        let depth = f64::from(job.depth.unwrap_or(job.resource_requirement));
        (self.depth_weight * depth * self.layer_time + self.readout_time) * machine.time_scale
    }
}

/// A valid machine for a job with its scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMachine {
    /// Index of the machine in the input slice.
    pub index: usize,
    /// Machine id.
    pub machine: MachineId,
    /// Affinity (lower is better).
    pub affinity: f64,
    /// Estimated duration.
    pub eta: Time,
}

/// Machines that can host `job` whole.
pub fn valid_backends<'a>(job: &Job, machines: &'a [Machine]) -> Vec<&'a Machine> {
    machines
        .iter()
        .filter(|m| m.fits(job.resource_requirement))
        .collect()
}

/// Score every valid backend of `job`, best affinity first (ties by id).
pub fn score_backends(
    job: &Job,
    machines: &[Machine],
    scorer: &Arc<dyn AffinityScorer>,
    eta: &EtaModel,
) -> Vec<ScoredMachine> {
    let mut scored: Vec<ScoredMachine> = machines
        .iter()
        .enumerate()
        .filter(|(_, m)| m.fits(job.resource_requirement))
        .map(|(index, machine)| ScoredMachine {
            index,
            machine: machine.id.clone(),
            affinity: scorer.score(job, machine),
            eta: eta.estimate(job, machine),
        })
        .collect();
    scored.sort_by(|a, b| {
        a.affinity
            .total_cmp(&b.affinity)
            .then_with(|| a.machine.cmp(&b.machine))
    });
    scored
}
