//! Persistence records.
//!
//! Two flat record types with fixed field names:
//!
//! - [`ScheduleReport`]: one result row per run (`result.json`).
//! - [`ScheduleRecord`]: one row per scheduled job (`schedule.json`).
//!
//! Both are written with [`write_json`] and schedules read back with
//! [`ScheduleRecord::load`].

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use qsched_core::{Assignment, CoreError, Job, JobArena, Machine};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult};
use crate::metrics::ScheduleMetrics;

/// Result record of one scheduling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleReport {
    /// Number of submitted (top-level) jobs.
    pub num_circuits: usize,
    /// Workload family the jobs came from.
    pub algorithm_name: String,
    /// Mean resource requirement of the submitted jobs.
    pub average_qubits: f64,
    /// Scheduler report name (FFD, MTMC, MILQ, NoTaDS).
    pub schedule_name: String,
    /// Machine id to capacity.
    pub type_machine: BTreeMap<String, u32>,
    pub average_turnaround_time: f64,
    pub average_response_time: f64,
    pub average_fidelity: f64,
    pub sampling_overhead: f64,
    pub average_throughput: f64,
    pub average_utilization: f64,
    /// Wall-clock seconds spent in the scheduler.
    pub scheduler_latency: f64,
    pub makespan: f64,
    /// Whether the MILP solver stopped before proving optimality.
    #[serde(default)]
    pub partial_optimality: bool,
    /// When the report was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ScheduleReport {
    /// Assemble the report of a finished run.
    pub fn build(
        workload: &str,
        arena: &JobArena,
        machines: &[Machine],
        assignment: &Assignment,
        metrics: &ScheduleMetrics,
        scheduler_latency: f64,
    ) -> Self {
        let roots: Vec<&Job> = arena.roots().collect();
        let average_qubits = if roots.is_empty() {
            0.0
        } else {
            roots
                .iter()
                .map(|j| f64::from(j.resource_requirement))
                .sum::<f64>()
                / roots.len() as f64
        };

        Self {
            num_circuits: roots.len(),
            algorithm_name: workload.to_string(),
            average_qubits,
            schedule_name: assignment.scheduler.clone(),
            type_machine: machines
                .iter()
                .map(|m| (m.id.to_string(), m.capacity))
                .collect(),
            average_turnaround_time: metrics.average_turnaround_time,
            average_response_time: metrics.average_response_time,
            average_fidelity: metrics.average_fidelity,
            sampling_overhead: metrics.sampling_overhead,
            average_throughput: metrics.throughput,
            average_utilization: metrics.average_utilization,
            scheduler_latency,
            makespan: metrics.makespan,
            partial_optimality: assignment.partial_optimality,
            timestamp: Some(Utc::now()),
        }
    }
}

/// One scheduled job in the flat schedule format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub job: String,
    pub qubits: u32,
    pub machine: String,
    pub capacity: u32,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
}

impl ScheduleRecord {
    /// One record per assignment entry, in assignment order.
    pub fn from_assignment(assignment: &Assignment, machines: &[Machine]) -> EvalResult<Vec<Self>> {
        assignment
            .entries
            .iter()
            .map(|entry| {
                let machine = machines
                    .iter()
                    .find(|m| m.id == entry.machine)
                    .ok_or_else(|| CoreError::UnknownMachine(entry.machine.to_string()))?;
                Ok(Self {
                    job: entry.job.to_string(),
                    qubits: entry.requirement,
                    machine: entry.machine.to_string(),
                    capacity: machine.capacity,
                    start: entry.start,
                    end: entry.end,
                    duration: entry.duration(),
                })
            })
            .collect()
    }

    /// Check a loaded row set.
    ///
    /// Rejects duplicate jobs, empty or inconsistent windows, requirements
    /// above capacity, and a machine listed with two capacities.
    pub fn validate(records: &[Self]) -> EvalResult<()> {
        let mut jobs = FxHashSet::default();
        let mut capacities: BTreeMap<&str, u32> = BTreeMap::new();
        for record in records {
            let invalid = |reason: String| {
                EvalError::Export(format!("schedule row for job {}: {}", record.job, reason))
            };
            if !jobs.insert(record.job.as_str()) {
                return Err(invalid("duplicate job".into()));
            }
            if record.end <= record.start {
                return Err(invalid(format!("empty window [{}, {})", record.start, record.end)));
            }
            if (record.end - record.start - record.duration).abs() > 1e-9 {
                return Err(invalid(format!(
                    "duration {} does not match window",
                    record.duration
                )));
            }
            if record.qubits > record.capacity {
                return Err(invalid(format!(
                    "{} qubits exceed capacity {}",
                    record.qubits, record.capacity
                )));
            }
            let known = *capacities
                .entry(record.machine.as_str())
                .or_insert(record.capacity);
            if known != record.capacity {
                return Err(invalid(format!(
                    "machine {} listed with capacities {} and {}",
                    record.machine, known, record.capacity
                )));
            }
        }
        Ok(())
    }

    /// Load and validate rows from a JSON file.
    pub fn load(path: &Path) -> EvalResult<Vec<Self>> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EvalError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let records: Vec<Self> = serde_json::from_str(&text)?;
        Self::validate(&records)?;
        Ok(records)
    }
}

/// Render records as JSON, indented unless `compact`.
pub fn render_json<T: Serialize + ?Sized>(records: &T, compact: bool) -> EvalResult<String> {
    let text = if compact {
        serde_json::to_string(records)?
    } else {
        serde_json::to_string_pretty(records)?
    };
    Ok(text)
}

/// Write records to `path` in the layout [`ScheduleRecord::load`] reads.
pub fn write_json<T: Serialize + ?Sized>(
    records: &T,
    path: &Path,
    compact: bool,
) -> EvalResult<()> {
    let mut text = render_json(records, compact)?;
    text.push('\n');
    std::fs::write(path, text)
        .map_err(|e| EvalError::Io(format!("Failed to write {}: {}", path.display(), e)))
}
