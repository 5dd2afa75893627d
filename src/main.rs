use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orgtwin::manager::Manager;
use std::path::PathBuf;

/// Organizational digital twin driven by a simulated market.
#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    /// Directory holding config.toml and the run directories.
    #[arg(long)]
    sim_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a new run from day zero.
    Create,

    /// Continue a run from its checkpoint.
    Resume {
        #[arg(long)]
        run_idx: usize,
    },

    /// Inject a named crisis into a run's checkpoint.
    Crisis {
        #[arg(long)]
        run_idx: usize,

        #[arg(long)]
        kind: String,

        #[arg(long, default_value_t = 0.7)]
        severity: f64,
    },

    /// Log the current state of a run.
    Status {
        #[arg(long)]
        run_idx: usize,
    },

    /// Summarize every run's trajectory into results files.
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
    log::debug!("{args:#?}");

    let mgr = Manager::new(&args.sim_dir)
        .with_context(|| format!("failed to open simulation at {:?}", args.sim_dir))?;

    match args.command {
        Command::Create => mgr.create_run()?,
        Command::Resume { run_idx } => mgr.resume_run(run_idx)?,
        Command::Crisis {
            run_idx,
            kind,
            severity,
        } => mgr.inject_crisis(run_idx, &kind, severity)?,
        Command::Status { run_idx } => mgr.report_status(run_idx)?,
        Command::Analyze => mgr.analyze_sim()?,
        Command::Clean => mgr.clean_sim()?,
    }

    Ok(())
}
