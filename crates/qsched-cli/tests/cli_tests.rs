//! CLI command parsing and end-to-end tests.
//!
//! Argument parsing is tested via clap `try_parse_from` against a mirror of
//! the binary's CLI structs; the commands themselves are tested by running
//! the built `qsched` binary.

// ============================================================================
// clap parsing tests
// ============================================================================

mod clap_parsing {
    use clap::{Parser, Subcommand};

    // Mirror the CLI struct for testing (since main.rs is a binary)
    #[derive(Parser)]
    #[command(name = "qsched")]
    struct TestCli {
        #[arg(short, long, action = clap::ArgAction::Count, global = true)]
        verbose: u8,

        #[command(subcommand)]
        command: TestCommands,
    }

    #[derive(Subcommand)]
    enum TestCommands {
        Run {
            #[arg(short, long)]
            config: Option<String>,
            #[arg(short, long)]
            algorithm: Option<String>,
            #[arg(short = 'n', long)]
            num_jobs: Option<usize>,
            #[arg(short, long)]
            qubits_per_job: Option<u32>,
            #[arg(long)]
            seed: Option<u64>,
            #[arg(long)]
            time_limit: Option<f64>,
            #[arg(short = 'j', long, conflicts_with = "sequential")]
            threads: Option<usize>,
            #[arg(long)]
            sequential: bool,
            #[arg(long)]
            quality: Option<f64>,
            #[arg(short, long)]
            output: Option<String>,
            #[arg(long)]
            schedule: Option<String>,
            #[arg(long)]
            lp_export: Option<String>,
            #[arg(long)]
            no_replay: bool,
            #[arg(long)]
            compact: bool,
        },
        Algorithms,
        Validate {
            #[arg(short, long)]
            schedule: String,
        },
        Version,
    }

    #[test]
    fn test_run_defaults() {
        let cli = TestCli::try_parse_from(["qsched", "run"]).unwrap();
        assert_eq!(cli.verbose, 0);
        match cli.command {
            TestCommands::Run {
                config,
                algorithm,
                threads,
                sequential,
                no_replay,
                compact,
                ..
            } => {
                assert!(config.is_none());
                assert!(algorithm.is_none());
                assert!(threads.is_none());
                assert!(!sequential);
                assert!(!no_replay);
                assert!(!compact);
            }
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn test_run_all_flags() {
        let cli = TestCli::try_parse_from([
            "qsched",
            "run",
            "-c",
            "run.yaml",
            "-a",
            "milq",
            "-n",
            "12",
            "-q",
            "4",
            "--seed",
            "7",
            "--time-limit",
            "2.5",
            "-j",
            "8",
            "--quality",
            "0.9",
            "-o",
            "report.json",
            "--schedule",
            "schedule.json",
            "--lp-export",
            "model.lp",
            "--no-replay",
            "--compact",
        ])
        .unwrap();
        match cli.command {
            TestCommands::Run {
                config,
                algorithm,
                num_jobs,
                qubits_per_job,
                seed,
                time_limit,
                threads,
                quality,
                output,
                schedule,
                lp_export,
                no_replay,
                compact,
                ..
            } => {
                assert_eq!(config.as_deref(), Some("run.yaml"));
                assert_eq!(algorithm.as_deref(), Some("milq"));
                assert_eq!(num_jobs, Some(12));
                assert_eq!(qubits_per_job, Some(4));
                assert_eq!(seed, Some(7));
                assert_eq!(time_limit, Some(2.5));
                assert_eq!(threads, Some(8));
                assert_eq!(quality, Some(0.9));
                assert_eq!(output.as_deref(), Some("report.json"));
                assert_eq!(schedule.as_deref(), Some("schedule.json"));
                assert_eq!(lp_export.as_deref(), Some("model.lp"));
                assert!(no_replay);
                assert!(compact);
            }
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn test_threads_conflict_with_sequential() {
        let result = TestCli::try_parse_from(["qsched", "run", "-j", "4", "--sequential"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        assert!(TestCli::try_parse_from(["qsched", "run", "-n", "many"]).is_err());
        assert!(TestCli::try_parse_from(["qsched", "run", "--seed", "-1"]).is_err());
    }

    #[test]
    fn test_validate_requires_schedule() {
        assert!(TestCli::try_parse_from(["qsched", "validate"]).is_err());
        let cli = TestCli::try_parse_from(["qsched", "validate", "-s", "s.json"]).unwrap();
        match cli.command {
            TestCommands::Validate { schedule } => assert_eq!(schedule, "s.json"),
            _ => panic!("expected Validate"),
        }
    }

    #[test]
    fn test_global_verbose() {
        let cli = TestCli::try_parse_from(["qsched", "algorithms", "-vvv"]).unwrap();
        assert_eq!(cli.verbose, 3);
        assert!(matches!(cli.command, TestCommands::Algorithms));

        let cli = TestCli::try_parse_from(["qsched", "-v", "version"]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, TestCommands::Version));
    }

    #[test]
    fn test_unknown_subcommand() {
        assert!(TestCli::try_parse_from(["qsched", "submit"]).is_err());
        assert!(TestCli::try_parse_from(["qsched"]).is_err());
    }
}

// ============================================================================
// binary end-to-end tests
// ============================================================================

mod binary {
    use std::fs;
    use std::process::{Command, Output};

    fn qsched(args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_qsched"))
            .args(args)
            .output()
            .expect("failed to spawn qsched")
    }

    #[test]
    fn test_default_run_prints_report() {
        let out = qsched(&["run", "--sequential"]);
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

        let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
        assert_eq!(report["schedule_name"], "FFD");
        assert_eq!(report["num_circuits"], 2);
        assert_eq!(report["average_qubits"], 7.0);
        assert_eq!(report["type_machine"]["fake_belem"], 5);
        assert!(report["makespan"].as_f64().unwrap() > 0.0);
        assert!(report["sampling_overhead"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_run_from_config_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("run.yaml");
        fs::write(
            &config,
            "algorithm: mtmc\n\
             seed: 3\n\
             quality: 0.8\n\
             machines:\n  - id: m0\n    capacity: 6\n  - id: m1\n    capacity: 4\n\
             jobs:\n  - id: a\n    qubits: 3\n  - id: b\n    qubits: 4\n  - id: c\n    qubits: 2\n\
             pipeline:\n  workload: qft\n",
        )
        .unwrap();
        let report_path = dir.path().join("report.json");
        let schedule_path = dir.path().join("schedule.json");

        let out = qsched(&[
            "run",
            "--sequential",
            "-c",
            config.to_str().unwrap(),
            "-o",
            report_path.to_str().unwrap(),
            "--schedule",
            schedule_path.to_str().unwrap(),
        ]);
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        assert!(out.stdout.is_empty());

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(report["schedule_name"], "MTMC");
        assert_eq!(report["algorithm_name"], "qft");
        assert_eq!(report["num_circuits"], 3);
        assert!((report["average_fidelity"].as_f64().unwrap() - 0.8).abs() < 1e-12);

        let validated = qsched(&["validate", "-s", schedule_path.to_str().unwrap()]);
        assert!(
            validated.status.success(),
            "{}",
            String::from_utf8_lossy(&validated.stderr)
        );
        assert!(String::from_utf8_lossy(&validated.stdout).contains("3 job(s)"));
    }

    #[test]
    fn test_unknown_algorithm_fails() {
        let out = qsched(&["run", "-a", "round_robin"]);
        assert!(!out.status.success());
        assert!(String::from_utf8_lossy(&out.stderr).contains("unknown algorithm"));
    }

    #[test]
    fn test_missing_config_fails() {
        let out = qsched(&["run", "-c", "/nonexistent/run.yaml"]);
        assert!(!out.status.success());
        assert!(String::from_utf8_lossy(&out.stderr).contains("File not found"));
    }

    #[test]
    fn test_inconsistent_schedule_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        fs::write(
            &path,
            r#"[
  {"job": "a", "qubits": 3, "machine": "m0", "capacity": 5, "start": 0.0, "end": 3.0, "duration": 3.0},
  {"job": "a", "qubits": 3, "machine": "m0", "capacity": 5, "start": 3.0, "end": 6.0, "duration": 3.0}
]"#,
        )
        .unwrap();

        let out = qsched(&["validate", "-s", path.to_str().unwrap()]);
        assert!(!out.status.success());
    }

    #[test]
    fn test_seed_help_names_sequential() {
        let out = qsched(&["run", "--help"]);
        assert!(out.status.success());
        let text = String::from_utf8_lossy(&out.stdout);
        let seed_line = text
            .lines()
            .find(|line| line.trim_start().starts_with("--seed"))
            .expect("no --seed in help");
        assert!(seed_line.contains("--sequential"), "{seed_line}");
    }

    #[test]
    fn test_sequential_seeded_runs_repeat() {
        let args = ["run", "--sequential", "-a", "mtmc", "-n", "6", "-q", "4", "--seed", "11"];
        let first = qsched(&args);
        let second = qsched(&args);
        assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));

        let strip = |out: &Output| {
            let mut report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
            let obj = report.as_object_mut().unwrap();
            obj.remove("scheduler_latency");
            obj.remove("timestamp");
            report
        };
        assert_eq!(strip(&first), strip(&second));
    }

    #[test]
    fn test_algorithms_lists_all() {
        let out = qsched(&["algorithms"]);
        assert!(out.status.success());
        let text = String::from_utf8_lossy(&out.stdout);
        for name in ["FFD", "MTMC", "MILQ", "NoTaDS"] {
            assert!(text.contains(name), "missing {name}");
        }
    }
}
