mod analysis;
mod config;
mod engine;
mod manager;
mod model;
mod recorder;
mod sampler;
mod stats;

use crate::manager::Manager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bounded confidence opinion dynamics with heterogeneous tolerances.
#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    /// Simulation directory containing `config.toml`.
    #[arg(long)]
    sim_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a new run from random opinions and tolerances.
    Create,

    /// Perform another `num_runs` ticks of an existing run.
    Resume {
        #[arg(long)]
        run_idx: usize,
    },

    /// Summarize every run and classify its outcome.
    Analyze,

    /// Remove every run directory.
    Clean,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mgr = Manager::new(&args.sim_dir)
        .with_context(|| format!("failed to open simulation in {:?}", args.sim_dir))?;

    match args.command {
        Command::Create => mgr.create_run()?,
        Command::Resume { run_idx } => mgr.resume_run(run_idx)?,
        Command::Analyze => mgr.analyze_sim()?,
        Command::Clean => mgr.clean_sim()?,
    }

    Ok(())
}
