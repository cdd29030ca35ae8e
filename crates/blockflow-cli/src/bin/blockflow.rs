//! blockflow: run a flowchart diagram, or test it over every interleaving of its threads.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use blockflow_cli::{
    all_passed, load_diagram, render_report, reports_to_json, run_tests, TestOptions,
};
use blockflow_eval::{Runtime, StdIo};

#[derive(Parser, Debug)]
#[command(name = "blockflow")]
#[command(about = "Run flowchart diagrams and test them against every thread interleaving")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every thread of a diagram live against stdin/stdout
    Run {
        /// Diagram file (JSON)
        #[arg(value_name = "DIAGRAM")]
        diagram: PathBuf,
    },

    /// Explore every interleaving and report how often the output matches
    Test {
        /// Diagram file (JSON)
        #[arg(value_name = "DIAGRAM")]
        diagram: PathBuf,

        /// Test case file (JSON), a single case or a `testCases` suite
        #[arg(long, value_name = "FILE")]
        cases: Option<PathBuf>,

        /// One line of input, in order (repeatable)
        #[arg(long = "input", value_name = "VALUE")]
        inputs: Vec<String>,

        /// One expected output line, in order (repeatable)
        #[arg(long = "expect", value_name = "LINE")]
        expected: Vec<String>,

        /// Stop after this many explored states
        #[arg(long, value_name = "N")]
        max_states: Option<usize>,

        /// Abandon schedules longer than this many steps
        #[arg(long, value_name = "N")]
        max_steps: Option<usize>,

        /// Print reports as JSON
        #[arg(long)]
        json: bool,

        /// Show the success rate for every step count
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(2);
        }
    }
}

/// Returns whether the command succeeded.
fn run(args: Args) -> Result<bool> {
    match args.command {
        Command::Run { diagram } => {
            let diagram = load_diagram(&diagram)?;
            let summary = Runtime::new(Arc::new(StdIo::new())).run(&diagram, "stdio");
            for thread in summary.failures() {
                if let Some(err) = &thread.error {
                    eprintln!("thread {} failed: {}", thread.index, err);
                }
            }
            Ok(summary.is_success())
        }
        Command::Test {
            diagram,
            cases,
            inputs,
            expected,
            max_states,
            max_steps,
            json,
            verbose,
        } => {
            let diagram = load_diagram(&diagram)?;
            let options = TestOptions {
                cases,
                inputs,
                expected,
                max_states,
                max_steps,
            };
            let reports = run_tests(&diagram, &options)?;

            if json {
                let doc = reports_to_json(&reports).context("failed to encode reports")?;
                println!("{}", doc);
            } else {
                for (name, report) in &reports {
                    print!("{}", render_report(name, report, verbose));
                }
            }
            Ok(all_passed(&reports))
        }
    }
}
