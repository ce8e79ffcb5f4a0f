//! End-to-end pipeline scenarios across all schedulers.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use qsched_core::{
    Assignment, AssignmentEntry, CombinedExecutionUnit, ExecutionResult, Job, JobArena, Machine,
};
use qsched_eval::{
    ExecutionError, Executor, MetricsConfig, Pipeline, PipelineConfig, UniformExecutor,
    compute_metrics,
};
use qsched_sched::{ExecutionMode, ParallelConfig, SchedulerKind};

fn config(kind: SchedulerKind) -> PipelineConfig {
    let mut config = PipelineConfig::default().with_algorithm(kind);
    config.scheduler.parallel = ParallelConfig::default().with_mode(ExecutionMode::Sequential);
    config.scheduler.ilp = config.scheduler.ilp.with_time_limit_secs(Some(30.0));
    config.scheduler.whole_job = config.scheduler.whole_job.with_time_limit_secs(Some(30.0));
    config
}

#[test]
fn test_every_algorithm_runs_end_to_end() {
    let machines = vec![Machine::new("m0", 5).unwrap(), Machine::new("m1", 4).unwrap()];
    for kind in SchedulerKind::ALL {
        let jobs = vec![
            Job::new("a", 3).unwrap(),
            Job::new("b", 2).unwrap(),
            Job::new("wide", 7).unwrap(),
        ];
        let pipeline = Pipeline::new(config(kind), Arc::new(UniformExecutor::new(0.9)));
        let outcome = pipeline
            .run(jobs, &machines)
            .unwrap_or_else(|e| panic!("{kind}: {e}"));

        assert_eq!(outcome.report.schedule_name, kind.report_name());
        assert_eq!(outcome.report.num_circuits, 3);
        assert_eq!(outcome.metrics.num_jobs, 4, "{kind}: wide splits in two");
        assert!(outcome.metrics.sampling_overhead > 0.0);
        assert!(outcome.metrics.makespan > 0.0);
        assert!((outcome.report.average_fidelity - 0.9).abs() < 1e-12);
        assert!(outcome.arena.leaves().all(|j| j.placement.is_some()));
    }
}

#[test]
fn test_packed_jobs_execute_as_one_unit() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let executor = move |unit: &CombinedExecutionUnit,
                         _: &Machine|
          -> Result<ExecutionResult, ExecutionError> {
        log.lock().unwrap().push(unit.members.len());
        let mut counts = BTreeMap::new();
        counts.insert("0110".to_string(), 60);
        counts.insert("1001".to_string(), 40);
        Ok(ExecutionResult::with_quality(0.9).with_counts(counts))
    };

    let machines = vec![Machine::new("m0", 4).unwrap()];
    let jobs = vec![Job::new("a", 2).unwrap(), Job::new("b", 2).unwrap()];
    let outcome = Pipeline::new(config(SchedulerKind::Ilp), Arc::new(executor))
        .run(jobs, &machines)
        .unwrap();

    assert_eq!(outcome.units.len(), 1);
    assert!(outcome.units[0].is_merged());
    assert_eq!(*seen.lock().unwrap(), vec![2]);
    for job in outcome.arena.leaves() {
        assert_eq!(job.result_quality, Some(0.9));
    }
    assert_eq!(outcome.metrics.makespan, 2.0);
}

#[test]
fn test_reports_serialize_flat() {
    let machines = vec![Machine::new("ibm_perth", 7).unwrap()];
    let outcome = Pipeline::new(
        config(SchedulerKind::Greedy).with_workload("ghz"),
        Arc::new(UniformExecutor::default()),
    )
    .run(vec![Job::new("1", 7).unwrap()], &machines)
    .unwrap();

    let json = serde_json::to_value(&outcome.report).unwrap();
    assert_eq!(json["algorithm_name"], "ghz");
    assert_eq!(json["schedule_name"], "FFD");
    assert_eq!(json["makespan"], 7.0);
    assert_eq!(json["average_utilization"], 1.0);
    assert_eq!(json["partial_optimality"], false);
}

struct Flaky;

impl Executor for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn execute(
        &self,
        unit: &CombinedExecutionUnit,
        _machine: &Machine,
    ) -> Result<ExecutionResult, ExecutionError> {
        if unit.machine.as_str() == "bad" {
            Err(ExecutionError::new(unit, "readout failure"))
        } else {
            Ok(ExecutionResult::with_quality(1.0))
        }
    }
}

#[test]
fn test_executor_failure_aborts_run() {
    let machines = vec![Machine::new("bad", 5).unwrap()];
    let err = Pipeline::new(config(SchedulerKind::Greedy), Arc::new(Flaky))
        .run(vec![Job::new("a", 1).unwrap()], &machines)
        .unwrap_err();
    assert!(err.to_string().contains("readout failure"));
}

fn arb_schedule() -> impl Strategy<Value = (JobArena, Vec<Machine>)> {
    prop::collection::vec((1_u32..=5, 0_u32..=3, 0_u32..=10, 0.0_f64..=1.0), 1..=20).prop_map(
        |specs| {
            let machines: Vec<Machine> = (0..4)
                .map(|i| Machine::new(format!("m{i}"), 5).unwrap())
                .collect();
            let mut assignment = Assignment::new("test");
            let mut jobs = Vec::new();
            for (i, (req, machine, start, _)) in specs.iter().enumerate() {
                let job = Job::new(format!("j{i}"), *req).unwrap();
                let start = f64::from(*start) + i as f64 * 16.0;
                assignment.push(AssignmentEntry::new(
                    &job,
                    machines[*machine as usize].id.clone(),
                    start,
                    start + f64::from(*req),
                ));
                jobs.push(job);
            }
            let mut arena = JobArena::from_jobs(jobs).unwrap();
            arena.apply_assignment(&assignment).unwrap();
            for (i, (_, _, _, quality)) in specs.iter().enumerate() {
                arena.record_result(&format!("j{i}").into(), *quality).unwrap();
            }
            (arena, machines)
        },
    )
}

proptest! {
    #[test]
    fn metrics_are_deterministic((arena, machines) in arb_schedule()) {
        let config = MetricsConfig::default();
        let first = compute_metrics(&arena, &machines, &config).unwrap();
        let second = compute_metrics(&arena, &machines, &config).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert!(first.makespan > 0.0);
        prop_assert!(first.average_utilization <= 1.0 + 1e-9);
        prop_assert!(first.throughput > 0.0);
    }
}
