//! # kiln CLI Entry Point
//!
//! Tasks are given as a queue and run in order, e.g. `kiln clean main`.
//! An unknown task prints usage and stops the queue.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use std::path::PathBuf;

use kiln::build::{self, BuildOrchestrator};
use kiln::config;
use kiln::ide;

const AFTER_HELP: &str = "\
TASKS:
  all               Clean, rebuild, and launch the target
  clean             Delete all build output
  compile_commands  Generate compile_commands.json for clangd
  main              Compile the target
  run               Launch the already built target
  watch             Rebuild and launch on every change to the trigger path
  help              Print this message";

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "A minimal parallel, incremental C/C++ build orchestrator", version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = AFTER_HELP)]
struct Cli {
    /// Tasks to run, in order
    tasks: Vec<String>,
    /// Project root
    #[arg(short = 'C', long, default_value = ".")]
    dir: PathBuf,
    /// Maximum parallel compiler processes (overrides kiln.toml)
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Target to build; its entry point is <main_dir>/<target>.c
    #[arg(short, long, default_value = "main")]
    target: String,
    /// Show staleness decisions for every unit
    #[arg(short, long)]
    verbose: bool,
}

enum Flow {
    Continue,
    Stop,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.tasks.is_empty() {
        print_usage()?;
        return Ok(());
    }

    let root = cli
        .dir
        .canonicalize()
        .with_context(|| format!("Project directory {} not found", cli.dir.display()))?;
    let mut config = config::load_config(&root)?;
    if let Some(jobs) = cli.jobs {
        config = config.with_concurrency(jobs);
    }
    let orchestrator = BuildOrchestrator::new(root, config).verbose(cli.verbose);

    for task in &cli.tasks {
        match run_task(&orchestrator, task, &cli.target) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => break,
            Err(e) => {
                println!("{} {:#}", "x".red(), e);
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn run_task(orchestrator: &BuildOrchestrator, task: &str, target: &str) -> Result<Flow> {
    match task {
        "all" => {
            if orchestrator.all(target)?.is_none() {
                anyhow::bail!("{} was not built", target);
            }
        }
        "clean" => orchestrator.clean()?,
        "compile_commands" => {
            ide::write_compile_commands(orchestrator)?;
        }
        "main" => {
            let report = orchestrator.compile(target)?;
            if !report.succeeded() {
                anyhow::bail!("{} was not built", target);
            }
        }
        "run" => {
            orchestrator.run(target)?;
        }
        "watch" => build::watch(orchestrator, target)?,
        _ => {
            if task != "help" {
                println!("{} Unknown task '{}'", "!".yellow(), task);
            }
            print_usage()?;
            return Ok(Flow::Stop);
        }
    }
    Ok(Flow::Continue)
}

fn print_usage() -> Result<()> {
    Cli::command().print_help()?;
    println!();
    Ok(())
}
