//! Shared helpers for CLI commands: the run configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use qsched_core::{Job, Machine, Time};
use qsched_eval::PipelineConfig;
use qsched_sched::ExecutionMode;

/// A machine entry in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSpec {
    pub id: String,
    pub capacity: u32,
    #[serde(default = "one")]
    pub time_scale: f64,
}

/// A job entry in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    pub qubits: u32,
    #[serde(default)]
    pub submission_time: Time,
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default = "one")]
    pub weight: f64,
}

fn one() -> f64 {
    1.0
}

/// Contents of a run configuration file.
///
/// Jobs are either listed explicitly or generated as `num_jobs` identical
/// jobs of `qubits_per_job` qubits named `1..=num_jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub machines: Vec<MachineSpec>,
    pub jobs: Vec<JobSpec>,
    pub num_jobs: usize,
    pub qubits_per_job: u32,
    /// Algorithm name, see `qsched algorithms`.
    pub algorithm: String,
    /// Seed for the probabilistic heuristic. Runs repeat exactly only in
    /// sequential mode; worker threads race for capacity claims.
    pub seed: Option<u64>,
    /// MILP solver deadline in seconds.
    pub time_limit_secs: Option<f64>,
    /// Quality reported by the built-in executor.
    pub quality: f64,
    /// Write the formulated MILP here (ILP algorithms only).
    pub lp_export: Option<PathBuf>,
    pub pipeline: PipelineConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            machines: vec![
                MachineSpec {
                    id: "fake_belem".into(),
                    capacity: 5,
                    time_scale: 1.0,
                },
                MachineSpec {
                    id: "fake_manila".into(),
                    capacity: 5,
                    time_scale: 1.0,
                },
            ],
            jobs: Vec::new(),
            num_jobs: 2,
            qubits_per_job: 7,
            algorithm: "ffd".into(),
            seed: None,
            time_limit_secs: None,
            quality: 1.0,
            lp_export: None,
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Flag values that override the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub algorithm: Option<String>,
    pub num_jobs: Option<usize>,
    pub qubits_per_job: Option<u32>,
    pub seed: Option<u64>,
    pub time_limit_secs: Option<f64>,
    pub quality: Option<f64>,
    pub threads: Option<usize>,
    pub sequential: bool,
    pub no_replay: bool,
    pub lp_export: Option<PathBuf>,
}

impl RunConfig {
    /// Load from YAML (`.yaml`/`.yml`) or JSON (anything else).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => serde_yaml_ng::from_str(&source)
                .with_context(|| format!("Invalid YAML config {}", path.display())),
            _ => serde_json::from_str(&source)
                .with_context(|| format!("Invalid JSON config {}", path.display())),
        }
    }

    /// Apply command-line overrides.
    pub fn apply(&mut self, overrides: RunOverrides) {
        if let Some(algorithm) = overrides.algorithm {
            self.algorithm = algorithm;
        }
        if let Some(n) = overrides.num_jobs {
            self.num_jobs = n;
            self.jobs.clear();
        }
        if let Some(q) = overrides.qubits_per_job {
            self.qubits_per_job = q;
        }
        if overrides.seed.is_some() {
            self.seed = overrides.seed;
        }
        if overrides.time_limit_secs.is_some() {
            self.time_limit_secs = overrides.time_limit_secs;
        }
        if let Some(quality) = overrides.quality {
            self.quality = quality;
        }
        if let Some(threads) = overrides.threads {
            self.pipeline.execution = ExecutionMode::Parallel { threads };
            self.pipeline.scheduler.parallel.mode = ExecutionMode::Parallel { threads };
        }
        if overrides.sequential {
            self.pipeline.execution = ExecutionMode::Sequential;
            self.pipeline.scheduler.parallel.mode = ExecutionMode::Sequential;
        }
        if overrides.no_replay {
            self.pipeline.replay = false;
        }
        if overrides.lp_export.is_some() {
            self.lp_export = overrides.lp_export;
        }
    }

    /// Resolve into typed inputs for the pipeline.
    pub fn resolve(mut self) -> Result<(Vec<Job>, Vec<Machine>, PipelineConfig)> {
        if !(0.0..=1.0).contains(&self.quality) {
            anyhow::bail!("quality must be within [0, 1], got {}", self.quality);
        }

        let machines = self
            .machines
            .iter()
            .map(|m| Ok(Machine::new(m.id.as_str(), m.capacity)?.with_time_scale(m.time_scale)))
            .collect::<Result<Vec<_>>>()?;
        if machines.is_empty() {
            anyhow::bail!("At least one machine must be configured");
        }

        let jobs = if self.jobs.is_empty() {
            (1..=self.num_jobs)
                .map(|i| Ok(Job::new(i.to_string(), self.qubits_per_job)?))
                .collect::<Result<Vec<_>>>()?
        } else {
            self.jobs
                .iter()
                .map(|spec| {
                    let mut job = Job::new(spec.id.as_str(), spec.qubits)?
                        .with_submission_time(spec.submission_time)
                        .with_weight(spec.weight);
                    if let Some(depth) = spec.depth {
                        job = job.with_depth(depth);
                    }
                    Ok(job)
                })
                .collect::<Result<Vec<_>>>()?
        };

        let mut pipeline = self.pipeline;
        pipeline.algorithm = self
            .algorithm
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        if let Some(seed) = self.seed {
            pipeline.scheduler.parallel.seed = seed;
        }
        if let Some(limit) = self.time_limit_secs {
            pipeline.scheduler.ilp.time_limit_secs = Some(limit);
            pipeline.scheduler.whole_job.time_limit_secs = Some(limit);
        }
        if let Some(path) = self.lp_export.take() {
            pipeline.scheduler.ilp.lp_export = Some(path.clone());
            pipeline.scheduler.whole_job.lp_export = Some(path);
        }
        Ok((jobs, machines, pipeline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qsched_sched::SchedulerKind;

    #[test]
    fn test_default_matches_reference_setup() {
        let (jobs, machines, pipeline) = RunConfig::default().resolve().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id.as_str(), "1");
        assert_eq!(jobs[0].resource_requirement, 7);
        assert_eq!(machines.len(), 2);
        assert_eq!(pipeline.algorithm, SchedulerKind::Greedy);
    }

    #[test]
    fn test_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        fs::write(
            &path,
            "algorithm: notads\n\
             machines:\n  - id: m0\n    capacity: 8\n\
             jobs:\n  - id: a\n    qubits: 3\n    submission_time: 2.0\n\
             time_limit_secs: 5\n",
        )
        .unwrap();

        let (jobs, machines, pipeline) = RunConfig::load(&path).unwrap().resolve().unwrap();
        assert_eq!(jobs[0].submission_time, 2.0);
        assert_eq!(machines[0].capacity, 8);
        assert_eq!(pipeline.algorithm, SchedulerKind::WholeJobIlp);
        assert_eq!(pipeline.scheduler.whole_job.time_limit_secs, Some(5.0));
    }

    #[test]
    fn test_overrides_win() {
        let mut config = RunConfig::default();
        config.apply(RunOverrides {
            algorithm: Some("MTMC".into()),
            num_jobs: Some(5),
            seed: Some(9),
            sequential: true,
            ..Default::default()
        });
        let (jobs, _, pipeline) = config.resolve().unwrap();
        assert_eq!(jobs.len(), 5);
        assert_eq!(pipeline.algorithm, SchedulerKind::Parallel);
        assert_eq!(pipeline.scheduler.parallel.seed, 9);
        assert_eq!(pipeline.execution, ExecutionMode::Sequential);
    }

    #[test]
    fn test_invalid_inputs() {
        let mut config = RunConfig::default();
        config.algorithm = "fifo".into();
        assert!(config.resolve().is_err());

        let config = RunConfig {
            machines: Vec::new(),
            ..Default::default()
        };
        assert!(config.resolve().is_err());

        let config = RunConfig {
            quality: 2.0,
            ..Default::default()
        };
        assert!(config.resolve().is_err());

        assert!(RunConfig::load(Path::new("/nonexistent/run.json")).is_err());
    }
}
