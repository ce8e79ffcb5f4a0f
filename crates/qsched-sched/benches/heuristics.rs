//! Benchmarks for the heuristic schedulers
//!
//! Run with: cargo bench -p qsched-sched

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use qsched_core::{Job, Machine};
use qsched_sched::{
    ExecutionMode, GreedyConfig, GreedyScheduler, Occupancy, ParallelConfig, ParallelScheduler,
    Scheduler,
};

fn workload(num_jobs: usize) -> (Vec<Job>, Vec<Machine>) {
    let jobs = (0..num_jobs)
        .map(|i| {
            Job::new(format!("job{i}"), 1 + (i * 7 % 20) as u32)
                .unwrap()
                .with_submission_time((i % 10) as f64)
        })
        .collect();
    let machines = vec![
        Machine::new("ibm_kyiv", 27).unwrap(),
        Machine::new("ibm_perth", 20).unwrap(),
        Machine::new("iqm_garnet", 20).unwrap(),
        Machine::new("iqm_5q", 5).unwrap(),
    ];
    (jobs, machines)
}

/// Benchmark first-fit decreasing in both occupancy modes
fn bench_greedy(c: &mut Criterion) {
    let mut group = c.benchmark_group("greedy");

    for num_jobs in &[10, 100, 500] {
        let (jobs, machines) = workload(*num_jobs);
        for (label, occupancy) in [("single", Occupancy::Single), ("shared", Occupancy::Shared)] {
            let scheduler = GreedyScheduler::new(GreedyConfig::default().with_occupancy(occupancy));
            group.bench_with_input(BenchmarkId::new(label, num_jobs), &jobs, |b, jobs| {
                b.iter(|| scheduler.schedule(black_box(jobs), black_box(&machines)).unwrap());
            });
        }
    }

    group.finish();
}

/// Benchmark the probabilistic heuristic, sequential against pooled
fn bench_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel");

    for num_jobs in &[10, 100, 500] {
        let (jobs, machines) = workload(*num_jobs);
        for (label, mode) in [
            ("sequential", ExecutionMode::Sequential),
            ("pool", ExecutionMode::Parallel { threads: 0 }),
        ] {
            let scheduler = ParallelScheduler::new(ParallelConfig::default().with_mode(mode));
            group.bench_with_input(BenchmarkId::new(label, num_jobs), &jobs, |b, jobs| {
                b.iter(|| scheduler.schedule(black_box(jobs), black_box(&machines)).unwrap());
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_greedy, bench_parallel);
criterion_main!(benches);
