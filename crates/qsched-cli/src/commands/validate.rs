//! Validate command implementation.

use std::path::Path;

use anyhow::Result;
use console::style;

use qsched_eval::ScheduleRecord;

/// Execute the validate command.
pub fn execute(schedule: &str) -> Result<()> {
    let records = ScheduleRecord::load(Path::new(schedule))?;

    let makespan = records.iter().map(|r| r.end).fold(0.0_f64, f64::max);
    let mut machines: Vec<&str> = records.iter().map(|r| r.machine.as_str()).collect();
    machines.sort_unstable();
    machines.dedup();

    println!(
        "{} {} job(s) on {} machine(s), makespan {:.3}",
        style("Valid").green().bold(),
        records.len(),
        machines.len(),
        makespan
    );
    Ok(())
}
