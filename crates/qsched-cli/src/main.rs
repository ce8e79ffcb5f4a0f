//! qsched Command-Line Interface
//!
//! Schedules quantum jobs across a pool of machines, runs the schedule
//! through the evaluation pipeline and writes a JSON report.
//!
//! ```text
//! qsched run --config run.yaml --algorithm milq --output report.json
//! qsched algorithms
//! qsched validate --schedule schedule.json
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::common::RunOverrides;
use commands::{algorithms, run, validate, version};

/// qsched - capacity-aware scheduling of quantum jobs
#[derive(Parser)]
#[command(name = "qsched")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule and execute a job set, then report metrics
    Run {
        /// Run configuration (YAML or JSON)
        #[arg(short, long, env = "QSCHED_CONFIG")]
        config: Option<String>,

        /// Scheduling algorithm (ffd, mtmc, milq, notads)
        #[arg(short, long)]
        algorithm: Option<String>,

        /// Generate this many identical jobs instead of the configured ones
        #[arg(short = 'n', long)]
        num_jobs: Option<usize>,

        /// Qubits per generated job
        #[arg(short, long)]
        qubits_per_job: Option<u32>,

        /// Seed for the probabilistic heuristic (repeatable only with --sequential)
        #[arg(long)]
        seed: Option<u64>,

        /// MILP solver deadline in seconds
        #[arg(long)]
        time_limit: Option<f64>,

        /// Worker threads for scheduling and execution (0 = one per core)
        #[arg(short = 'j', long, conflicts_with = "sequential")]
        threads: Option<usize>,

        /// Run every stage on the calling thread
        #[arg(long)]
        sequential: bool,

        /// Result quality reported by the built-in executor
        #[arg(long)]
        quality: Option<f64>,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Also write the per-job schedule records
        #[arg(long)]
        schedule: Option<String>,

        /// Write the formulated MILP (ILP algorithms only)
        #[arg(long)]
        lp_export: Option<String>,

        /// Keep the planned timeline even when actual durations differ
        #[arg(long)]
        no_replay: bool,

        /// Emit compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// List the available scheduling algorithms
    Algorithms,

    /// Check a schedule file for consistency
    Validate {
        /// Schedule records (JSON)
        #[arg(short, long)]
        schedule: String,
    },

    /// Show version information
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    let result = match cli.command {
        Commands::Run {
            config,
            algorithm,
            num_jobs,
            qubits_per_job,
            seed,
            time_limit,
            threads,
            sequential,
            quality,
            output,
            schedule,
            lp_export,
            no_replay,
            compact,
        } => {
            let overrides = RunOverrides {
                algorithm,
                num_jobs,
                qubits_per_job,
                seed,
                time_limit_secs: time_limit,
                quality,
                threads,
                sequential,
                no_replay,
                lp_export: lp_export.map(Into::into),
            };
            run::execute(
                config.as_deref(),
                overrides,
                output.as_deref(),
                schedule.as_deref(),
                compact,
            )
        }

        Commands::Algorithms => {
            algorithms::execute();
            Ok(())
        }

        Commands::Validate { schedule } => validate::execute(&schedule),

        Commands::Version => {
            version::execute();
            Ok(())
        }
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
