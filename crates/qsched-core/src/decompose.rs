//! Job decomposition (circuit cutting).
//!
//! Splits a job whose requirement exceeds the largest machine capacity into
//! the fewest capacity-fitting chunks, as balanced as possible, and prices the
//! split with a sampling overhead that grows with the number of cuts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::job::Job;

/// Sampling overhead as a function of the number of cut points.
///
/// Implementations must be monotonically non-decreasing in `cuts`.
pub trait OverheadModel: Send + Sync {
    /// Overhead incurred by `cuts` cut points (chunks - 1).
    fn overhead(&self, cuts: usize) -> f64;
}

impl<F> OverheadModel for F
where
    F: Fn(usize) -> f64 + Send + Sync,
{
    fn overhead(&self, cuts: usize) -> f64 {
        self(cuts)
    }
}

/// Overhead `per_cut * cuts`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearOverhead {
    pub per_cut: f64,
}

impl OverheadModel for LinearOverhead {
    fn overhead(&self, cuts: usize) -> f64 {
        self.per_cut * cuts as f64
    }
}

/// Overhead `base ^ cuts`.
///
/// Quasi-probability gate cutting of a CNOT costs a factor of 9 in samples
/// per cut, which is the default base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialOverhead {
    pub base: f64,
}

impl Default for ExponentialOverhead {
    fn default() -> Self {
        Self { base: 9.0 }
    }
}

impl OverheadModel for ExponentialOverhead {
    fn overhead(&self, cuts: usize) -> f64 {
        let cuts = i32::try_from(cuts).unwrap_or(i32::MAX);
        self.base.powi(cuts)
    }
}

/// Serializable choice of built-in overhead law.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum OverheadPolicy {
    /// See [`LinearOverhead`].
    Linear { per_cut: f64 },
    /// See [`ExponentialOverhead`].
    Exponential { base: f64 },
}

impl Default for OverheadPolicy {
    fn default() -> Self {
        OverheadPolicy::Exponential { base: 9.0 }
    }
}

impl OverheadPolicy {
    /// Build the model this policy describes.
    pub fn into_model(self) -> Arc<dyn OverheadModel> {
        match self {
            OverheadPolicy::Linear { per_cut } => Arc::new(LinearOverhead { per_cut }),
            OverheadPolicy::Exponential { base } => Arc::new(ExponentialOverhead { base }),
        }
    }
}

/// Output of a single decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    /// Child jobs in chunk order. Empty when the job already fits.
    pub children: Vec<Job>,
    /// Sampling overhead of this split (0 when nothing was split).
    pub overhead: f64,
}

impl Decomposition {
    /// Number of cut points.
    pub fn cuts(&self) -> usize {
        self.children.len().saturating_sub(1)
    }
}

/// Splits oversized jobs into capacity-fitting children.
#[derive(Clone)]
pub struct Decomposer {
    overhead: Arc<dyn OverheadModel>,
}

impl std::fmt::Debug for Decomposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decomposer").finish_non_exhaustive()
    }
}

impl Default for Decomposer {
    fn default() -> Self {
        Self::new(ExponentialOverhead::default())
    }
}

impl Decomposer {
    /// Create a decomposer with the given overhead law.
    pub fn new(overhead: impl OverheadModel + 'static) -> Self {
        Self {
            overhead: Arc::new(overhead),
        }
    }

    /// Create a decomposer from a shared overhead model.
    pub fn with_model(overhead: Arc<dyn OverheadModel>) -> Self {
        Self { overhead }
    }

    /// Overhead for a given number of cut points.
    pub fn overhead_for(&self, cuts: usize) -> f64 {
        self.overhead.overhead(cuts)
    }

    /// Chunk sizes for splitting `requirement` under `max_capacity`.
    ///
    /// Uses `ceil(requirement / max_capacity)` chunks. Sizes differ by at most
    /// one and the larger chunks come last.
    pub fn chunk_sizes(requirement: u32, max_capacity: u32) -> CoreResult<Vec<u32>> {
        if max_capacity == 0 {
            return Err(CoreError::InvalidCapacity {
                target: "decomposition limit".to_string(),
                capacity: 0,
            });
        }
        let chunks = requirement.div_ceil(max_capacity);
        if chunks <= 1 {
            return Ok(vec![requirement]);
        }
        let base = requirement / chunks;
        let remainder = requirement % chunks;
        Ok((0..chunks)
            .map(|i| if i >= chunks - remainder { base + 1 } else { base })
            .collect())
    }

    /// Split `job` into children each within `max_capacity`.
    ///
    /// A job that already fits is returned untouched as an empty
    /// decomposition. Children are named `{parent}_{index}` (1-based), point
    /// back at `job` and inherit its submission time, depth, weight and
    /// circuit handle.
    pub fn decompose(&self, job: &Job, max_capacity: u32) -> CoreResult<Decomposition> {
        let sizes = Self::chunk_sizes(job.resource_requirement, max_capacity)?;
        if sizes.len() <= 1 {
            return Ok(Decomposition {
                children: Vec::new(),
                overhead: 0.0,
            });
        }

        let mut children = Vec::with_capacity(sizes.len());
        for (index, size) in sizes.iter().enumerate() {
            let mut child = Job::new(job.id.child(index + 1), *size)?;
            child.parent = Some(job.id.clone());
            child.submission_time = job.submission_time;
            child.depth = job.depth;
            child.weight = job.weight;
            child.circuit_ref = job.circuit_ref.clone();
            children.push(child);
        }

        let overhead = self.overhead_for(children.len() - 1);
        debug!(
            "Decomposed job {} ({}) into {:?} under capacity {} (overhead {})",
            job.id, job.resource_requirement, sizes, max_capacity, overhead
        );

        Ok(Decomposition { children, overhead })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_sizes_balanced() {
        assert_eq!(Decomposer::chunk_sizes(12, 5).unwrap(), vec![4, 4, 4]);
        assert_eq!(Decomposer::chunk_sizes(11, 5).unwrap(), vec![3, 4, 4]);
        assert_eq!(Decomposer::chunk_sizes(10, 5).unwrap(), vec![5, 5]);
        assert_eq!(Decomposer::chunk_sizes(6, 5).unwrap(), vec![3, 3]);
        assert_eq!(Decomposer::chunk_sizes(4, 5).unwrap(), vec![4]);
    }

    #[test]
    fn test_chunk_sizes_zero_capacity() {
        let err = Decomposer::chunk_sizes(4, 0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCapacity { .. }));
    }

    #[test]
    fn test_decompose_twelve_into_three() {
        let job = Job::new("1", 12).unwrap().with_submission_time(1.0);
        let decomposition = Decomposer::default().decompose(&job, 5).unwrap();

        assert_eq!(decomposition.children.len(), 3);
        assert_eq!(decomposition.cuts(), 2);
        assert!(decomposition.overhead > 0.0);
        assert_eq!(
            decomposition
                .children
                .iter()
                .map(|c| c.resource_requirement)
                .sum::<u32>(),
            12
        );
        for (i, child) in decomposition.children.iter().enumerate() {
            assert!(child.resource_requirement <= 5);
            assert_eq!(child.id.as_str(), format!("1_{}", i + 1));
            assert_eq!(child.parent.as_ref(), Some(&job.id));
            assert_eq!(child.submission_time, 1.0);
        }
    }

    #[test]
    fn test_decompose_fitting_job_is_noop() {
        let job = Job::new("1", 5).unwrap();
        let decomposition = Decomposer::default().decompose(&job, 5).unwrap();
        assert!(decomposition.children.is_empty());
        assert_eq!(decomposition.overhead, 0.0);
    }

    #[test]
    fn test_overhead_laws() {
        let linear = Decomposer::new(LinearOverhead { per_cut: 2.5 });
        assert_eq!(linear.overhead_for(0), 0.0);
        assert_eq!(linear.overhead_for(2), 5.0);

        let exponential = Decomposer::default();
        assert_eq!(exponential.overhead_for(0), 1.0);
        assert_eq!(exponential.overhead_for(2), 81.0);

        let custom = Decomposer::new(|cuts: usize| 1.0 + cuts as f64);
        assert_eq!(custom.overhead_for(3), 4.0);
    }

    #[test]
    fn test_overhead_policy_serde() {
        let policy: OverheadPolicy =
            serde_json::from_str(r#"{"law": "linear", "per_cut": 3.0}"#).unwrap();
        assert_eq!(policy, OverheadPolicy::Linear { per_cut: 3.0 });
        assert_eq!(policy.into_model().overhead(2), 6.0);
    }
}
