//! Arena of jobs indexed by id.
//!
//! Parent/children edges are stored as [`JobId`] references on each [`Job`];
//! the arena owns every job and is the only place those edges are rewritten.
//! Decomposition is kept one level deep: the children of a top-level job are
//! always leaves.

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::assignment::Assignment;
use crate::decompose::Decomposer;
use crate::error::{CoreError, CoreResult};
use crate::job::{Job, JobId, Time};

/// Jobs owned by id, iterated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct JobArena {
    jobs: FxHashMap<JobId, Job>,
    order: Vec<JobId>,
}

impl JobArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an arena from a job list, rejecting duplicate ids.
    pub fn from_jobs(jobs: impl IntoIterator<Item = Job>) -> CoreResult<Self> {
        let mut arena = Self::new();
        for job in jobs {
            arena.insert(job)?;
        }
        Ok(arena)
    }

    /// Insert a job.
    pub fn insert(&mut self, job: Job) -> CoreResult<()> {
        if self.jobs.contains_key(&job.id) {
            return Err(CoreError::DuplicateJob(job.id.to_string()));
        }
        self.order.push(job.id.clone());
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn remove(&mut self, id: &JobId) -> Option<Job> {
        let job = self.jobs.remove(id)?;
        self.order.retain(|other| other != id);
        Some(job)
    }

    /// Number of jobs, parents included.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the arena holds no jobs.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Look up a job.
    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Look up a job mutably.
    pub fn get_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    fn require(&self, id: &JobId) -> CoreResult<&Job> {
        self.jobs
            .get(id)
            .ok_or_else(|| CoreError::UnknownJob(id.to_string()))
    }

    fn require_mut(&mut self, id: &JobId) -> CoreResult<&mut Job> {
        self.jobs
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownJob(id.to_string()))
    }

    /// All jobs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    /// Jobs without a parent.
    pub fn roots(&self) -> impl Iterator<Item = &Job> {
        self.iter().filter(|job| job.parent.is_none())
    }

    /// Jobs that are scheduled directly (no children).
    pub fn leaves(&self) -> impl Iterator<Item = &Job> {
        self.iter().filter(|job| job.is_leaf())
    }

    /// Owned copies of the leaf jobs, ready to hand to a scheduler.
    pub fn leaf_jobs(&self) -> Vec<Job> {
        self.leaves().cloned().collect()
    }

    /// Jobs that were split by decomposition.
    pub fn decomposed(&self) -> impl Iterator<Item = &Job> {
        self.iter().filter(|job| !job.is_leaf())
    }

    /// Children of a job in chunk order.
    pub fn children_of(&self, id: &JobId) -> CoreResult<Vec<&Job>> {
        let parent = self.require(id)?;
        parent
            .children
            .iter()
            .map(|child| self.require(child))
            .collect()
    }

    /// Decompose every leaf whose requirement exceeds `max_capacity`.
    ///
    /// A leaf that is itself a child is re-split and its pieces are attached
    /// to the top-level parent in its place, so the tree stays one level deep.
    /// The parent's overhead is recomputed from its total number of cuts.
    /// Returns the ids of the top-level jobs whose decomposition changed.
    pub fn decompose_oversized(
        &mut self,
        max_capacity: u32,
        decomposer: &Decomposer,
    ) -> CoreResult<Vec<JobId>> {
        if max_capacity == 0 {
            return Err(CoreError::InvalidCapacity {
                target: "decomposition limit".to_string(),
                capacity: 0,
            });
        }

        let oversized: Vec<JobId> = self
            .leaves()
            .filter(|job| job.resource_requirement > max_capacity)
            .map(|job| job.id.clone())
            .collect();

        let mut touched: Vec<JobId> = Vec::new();
        for id in oversized {
            let job = self.require(&id)?.clone();
            let top = job.parent.clone().unwrap_or_else(|| job.id.clone());
            let decomposition = decomposer.decompose(&job, max_capacity)?;
            let child_ids: Vec<JobId> = decomposition
                .children
                .iter()
                .map(|child| child.id.clone())
                .collect();

            if top != job.id {
                self.remove(&job.id);
                let parent = self.require_mut(&top)?;
                let slot = parent
                    .children
                    .iter()
                    .position(|c| c == &job.id)
                    .ok_or_else(|| {
                        CoreError::Internal(format!("{} is not a child of {}", job.id, top))
                    })?;
                parent.children.splice(slot..=slot, child_ids.iter().cloned());
            } else {
                self.require_mut(&top)?.children = child_ids.clone();
            }

            for mut child in decomposition.children {
                child.parent = Some(top.clone());
                self.insert(child)?;
            }

            let parent = self.require_mut(&top)?;
            let cuts = parent.children.len().saturating_sub(1);
            parent.overhead = Some(decomposer.overhead_for(cuts));
            debug!(
                "Job {} now has {} children (overhead {:?})",
                top,
                parent.children.len(),
                parent.overhead
            );
            if !touched.contains(&top) {
                touched.push(top);
            }
        }

        if !touched.is_empty() {
            info!(
                "Decomposed {} job(s) under capacity {}",
                touched.len(),
                max_capacity
            );
        }
        Ok(touched)
    }

    /// Write placements from an assignment back onto the leaf jobs.
    ///
    /// Fails if the assignment names an unknown job or a job that has
    /// children.
    pub fn apply_assignment(&mut self, assignment: &Assignment) -> CoreResult<()> {
        for entry in &assignment.entries {
            let job = self.require_mut(&entry.job)?;
            if !job.is_leaf() {
                return Err(CoreError::Internal(format!(
                    "decomposed job {} cannot be placed directly",
                    job.id
                )));
            }
            job.placement = Some(entry.placement());
        }
        Ok(())
    }

    /// Record the executed quality of a job.
    pub fn record_result(&mut self, id: &JobId, quality: f64) -> CoreResult<()> {
        self.require_mut(id)?.result_quality = Some(quality);
        Ok(())
    }

    /// Window spanned by a job: its own placement for a leaf, the envelope of
    /// its children's placements for a parent. `None` while any part is
    /// unscheduled.
    pub fn derived_window(&self, id: &JobId) -> CoreResult<Option<(Time, Time)>> {
        let job = self.require(id)?;
        if job.is_leaf() {
            return Ok(job.placement.as_ref().map(|p| (p.start, p.end)));
        }

        let mut window: Option<(Time, Time)> = None;
        for child in self.children_of(id)? {
            let Some(placement) = child.placement.as_ref() else {
                return Ok(None);
            };
            window = Some(match window {
                Some((start, end)) => (start.min(placement.start), end.max(placement.end)),
                None => (placement.start, placement.end),
            });
        }
        Ok(window)
    }

    /// Mean executed quality of a job's children (or its own for a leaf).
    pub fn derived_quality(&self, id: &JobId) -> CoreResult<Option<f64>> {
        let job = self.require(id)?;
        if job.is_leaf() {
            return Ok(job.result_quality);
        }
        let children = self.children_of(id)?;
        let qualities: Option<Vec<f64>> = children.iter().map(|c| c.result_quality).collect();
        Ok(qualities.map(|q| q.iter().sum::<f64>() / q.len() as f64))
    }
}
