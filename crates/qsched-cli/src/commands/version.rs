//! Version command implementation.

use console::style;

/// Execute the version command.
pub fn execute() {
    let version = env!("CARGO_PKG_VERSION");

    println!(
        "{} {} - capacity-aware scheduling of quantum jobs",
        style("qsched").cyan().bold(),
        style(format!("v{version}")).yellow()
    );
    println!();
    println!("Components:");
    println!("  qsched-core   Jobs, machines, decomposition and recomposition");
    println!("  qsched-sched  Greedy, parallel and MILP schedulers");
    println!("  qsched-eval   Execution pipeline, metrics and reports");
    println!("  qsched-cli    Command-line interface");
    println!();
    println!("License:    {}", style("Apache-2.0").dim());
}
