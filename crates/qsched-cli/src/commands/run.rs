//! Run command implementation.
//!
//! `qsched run [--config run.yaml] [--algorithm milq] [--output report.json]`

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use console::style;
use tracing::info;

use qsched_eval::{Pipeline, ScheduleRecord, UniformExecutor, render_json, write_json};

use super::common::{RunConfig, RunOverrides};

/// Execute the run command.
pub fn execute(
    config_path: Option<&str>,
    overrides: RunOverrides,
    output: Option<&str>,
    schedule: Option<&str>,
    compact: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => {
            info!("Loading run configuration from {path}");
            RunConfig::load(Path::new(path))?
        }
        None => RunConfig::default(),
    };
    config.apply(overrides);
    let quality = config.quality;
    let (jobs, machines, pipeline_config) = config.resolve()?;

    let pipeline = Pipeline::new(pipeline_config, Arc::new(UniformExecutor::new(quality)));
    let outcome = pipeline.run(jobs, &machines)?;

    let report = outcome.report;
    if let Some(output_path) = output {
        write_json(&report, Path::new(output_path), compact)?;
        eprintln!(
            "{} Report written to {}",
            style("OK").green().bold(),
            output_path
        );
    } else {
        println!("{}", render_json(&report, compact)?);
    }

    if let Some(schedule_path) = schedule {
        let records = ScheduleRecord::from_assignment(&outcome.assignment, &machines)?;
        write_json(&records, Path::new(schedule_path), compact)?;
        eprintln!(
            "{} Schedule written to {}",
            style("OK").green().bold(),
            schedule_path
        );
    }

    // Print summary to stderr
    eprintln!();
    eprintln!("{}", style("Schedule Summary").bold().underlined());
    eprintln!(
        "  Algorithm:   {}{}",
        report.schedule_name,
        if report.partial_optimality {
            style(" (time limit reached, not proven optimal)").yellow().to_string()
        } else {
            String::new()
        }
    );
    eprintln!(
        "  Jobs:        {} submitted, {} scheduled on {} machine(s), {} execution unit(s)",
        report.num_circuits,
        outcome.metrics.num_jobs,
        machines.len(),
        outcome.units.len()
    );
    eprintln!("  Makespan:    {:.3}", report.makespan);
    eprintln!(
        "  Turnaround:  {:.3} avg, response {:.3} avg",
        report.average_turnaround_time, report.average_response_time
    );
    eprintln!("  Utilization: {:.1}%", report.average_utilization * 100.0);
    for machine in &outcome.metrics.utilization {
        eprintln!(
            "    {:<16} {:>5.1}%  ({} job(s))",
            machine.machine.as_str(),
            machine.utilization * 100.0,
            machine.jobs
        );
    }
    eprintln!(
        "  Fidelity:    {:.4}, sampling overhead {:.1}",
        report.average_fidelity, report.sampling_overhead
    );
    eprintln!("  Latency:     {:.3}s", report.scheduler_latency);

    Ok(())
}
