mod analysis;
mod chart;
mod config;
mod extract;
mod manager;
mod probe;
mod sampler;
mod stats;

use crate::extract::MetricKind;
use crate::manager::Manager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    out_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sample the CPU usage of a process.
    Cpu {
        #[arg(long)]
        pid: String,
    },

    /// Sample the PSS memory usage of an app.
    Memory {
        #[arg(long)]
        package: String,
    },

    /// Remove all run directories.
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

    let mgr = Manager::new(args.out_dir).context("failed to construct mgr")?;

    match args.command {
        Command::Cpu { pid } => mgr.sample_target(MetricKind::Cpu, &pid)?,
        Command::Memory { package } => mgr.sample_target(MetricKind::Memory, &package)?,
        Command::Clean => mgr.clean_runs()?,
    }

    Ok(())
}
