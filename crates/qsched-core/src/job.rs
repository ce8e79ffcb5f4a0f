//! Job and machine types.
//!
//! A [`Job`] is an abstract unit of work with a resource requirement (the
//! qubit count of a circuit). A [`Machine`] is an execution resource with a
//! fixed capacity. Jobs reference each other by [`JobId`] only; ownership of
//! the parent/children edges lives in the [`JobArena`](crate::JobArena).

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Logical time used throughout the scheduler.
pub type Time = f64;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a job ID from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the id of the `index`-th child (1-based) of this job.
    ///
    /// Deterministic so that re-running a decomposition reproduces ids.
    pub fn child(&self, index: usize) -> Self {
        Self(format!("{}_{}", self.0, index))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier for a machine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(pub String);

impl MachineId {
    /// Create a machine ID from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MachineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MachineId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MachineId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Where and when a job runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Machine the job was assigned to.
    pub machine: MachineId,
    /// Start time (inclusive).
    pub start: Time,
    /// End time (exclusive).
    pub end: Time,
}

impl Placement {
    /// Create a new placement.
    pub fn new(machine: impl Into<MachineId>, start: Time, end: Time) -> Self {
        Self {
            machine: machine.into(),
            start,
            end,
        }
    }

    /// Length of the placement window.
    pub fn duration(&self) -> Time {
        self.end - self.start
    }

    /// Check whether two half-open windows `[start, end)` intersect.
    pub fn overlaps(&self, other: &Placement) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A unit of work submitted to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,

    /// Capacity a machine must offer to run this job undecomposed.
    pub resource_requirement: u32,

    /// Job this one was split from, if any.
    pub parent: Option<JobId>,

    /// Direct children produced by decomposition, in chunk order.
    pub children: Vec<JobId>,

    /// Logical time the job entered the system.
    pub submission_time: Time,

    /// Structural depth reported by the circuit generator.
    pub depth: Option<u32>,

    /// Weight in weighted-completion objectives.
    pub weight: f64,

    /// Opaque handle to the circuit behind this job. Never inspected.
    pub circuit_ref: Option<String>,

    /// Sampling overhead recorded when this job was decomposed.
    pub overhead: Option<f64>,

    /// Assignment written back after scheduling.
    pub placement: Option<Placement>,

    /// Quality of the executed result (e.g. fidelity), written once after execution.
    pub result_quality: Option<f64>,
}

impl Job {
    /// Create a new job.
    ///
    /// Fails with [`CoreError::InvalidJob`] if the requirement is zero.
    pub fn new(id: impl Into<JobId>, resource_requirement: u32) -> CoreResult<Self> {
        let id = id.into();
        if resource_requirement == 0 {
            return Err(CoreError::invalid_job(
                id.0,
                "resource requirement must be positive",
            ));
        }
        Ok(Self {
            id,
            resource_requirement,
            parent: None,
            children: Vec::new(),
            submission_time: 0.0,
            depth: None,
            weight: 1.0,
            circuit_ref: None,
            overhead: None,
            placement: None,
            result_quality: None,
        })
    }

    /// Set the submission time.
    pub fn with_submission_time(mut self, time: Time) -> Self {
        self.submission_time = time;
        self
    }

    /// Set the structural depth.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Set the objective weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Attach an opaque circuit handle.
    pub fn with_circuit_ref(mut self, circuit_ref: impl Into<String>) -> Self {
        self.circuit_ref = Some(circuit_ref.into());
        self
    }

    /// Whether this job is scheduled directly (it has no children).
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether this job was produced by decomposition.
    pub fn is_child(&self) -> bool {
        self.parent.is_some()
    }

    /// Assigned machine, if scheduled.
    pub fn assigned_machine(&self) -> Option<&MachineId> {
        self.placement.as_ref().map(|p| &p.machine)
    }

    /// Start time, if scheduled.
    pub fn start_time(&self) -> Option<Time> {
        self.placement.as_ref().map(|p| p.start)
    }

    /// End time, if scheduled.
    pub fn end_time(&self) -> Option<Time> {
        self.placement.as_ref().map(|p| p.end)
    }

    /// Scheduled duration, if scheduled.
    pub fn duration(&self) -> Option<Time> {
        self.placement.as_ref().map(Placement::duration)
    }
}

/// An execution resource with fixed capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Unique machine identifier.
    pub id: MachineId,

    /// Capacity (e.g. qubit count). Read-only during scheduling.
    pub capacity: u32,

    /// Relative slowdown applied to processing-time estimates (1.0 = nominal).
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
}

fn default_time_scale() -> f64 {
    1.0
}

impl Machine {
    /// Create a new machine.
    ///
    /// Fails with [`CoreError::InvalidCapacity`] if the capacity is zero.
    pub fn new(id: impl Into<MachineId>, capacity: u32) -> CoreResult<Self> {
        let id = id.into();
        if capacity == 0 {
            return Err(CoreError::InvalidCapacity {
                target: id.0,
                capacity: 0,
            });
        }
        Ok(Self {
            id,
            capacity,
            time_scale: 1.0,
        })
    }

    /// Set the relative time scale.
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    /// Whether this machine can host a job of the given requirement.
    pub fn fits(&self, requirement: u32) -> bool {
        requirement <= self.capacity
    }
}

/// Largest capacity over a machine set, `None` when the set is empty.
pub fn max_capacity(machines: &[Machine]) -> Option<u32> {
    machines.iter().map(|m| m.capacity).max()
}
