//! Algorithms command implementation.

use console::style;

use qsched_sched::SchedulerKind;

/// Execute the algorithms command.
pub fn execute() {
    println!("{} Available algorithms:\n", style("qsched").cyan().bold());

    for kind in SchedulerKind::ALL {
        let (aliases, summary) = describe(kind);
        println!(
            "  {} {}",
            style(kind.report_name()).bold(),
            style(format!("({})", aliases)).dim()
        );
        println!("    {summary}");
        println!();
    }
}

fn describe(kind: SchedulerKind) -> (&'static str, &'static str) {
    match kind {
        SchedulerKind::Greedy => (
            "ffd, greedy",
            "Largest job first onto the earliest-available machine that fits",
        ),
        SchedulerKind::Parallel => (
            "mtmc, parallel",
            "Seeded probabilistic packing of concurrent jobs across machines",
        ),
        SchedulerKind::Ilp => (
            "milq, ilp",
            "Time-indexed MILP packing jobs by capacity with setup times",
        ),
        SchedulerKind::WholeJobIlp => (
            "notads, ilp_whole",
            "MILP over whole jobs weighted by machine affinity",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_parse_back() {
        for kind in SchedulerKind::ALL {
            let (aliases, _) = describe(kind);
            for alias in aliases.split(", ") {
                assert_eq!(alias.parse::<SchedulerKind>().unwrap(), kind);
            }
        }
    }
}
