use chrono::Utc;
use clap::{Parser, Subcommand};
use dump_keeper::backup::backup_config::{BackupConfig, RunOutcome};
use dump_keeper::backup::result_error::result::Result;
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info, warn};

/// Dump databases, keep the newest archives, sweep the work dir
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up one plan, or every plan when none is given
    Run {
        #[arg(short, long)]
        plan: Option<String>,
    },
    /// Remove stale files from the work dir
    Cleanup,
    /// Only load and validate the config
    Check,
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed(r) => info!(
            "Plan {:?} stored {:?} ({} bytes), removed {} old archives",
            r.plan(),
            r.archive(),
            r.size(),
            r.retention().deleted_archives().len()
        ),
        RunOutcome::Skipped { plan, reason } => warn!("Plan {:?} skipped: {}", plan, reason),
    }
}

fn execute(config: &BackupConfig, command: Command) -> Result<()> {
    match command {
        Command::Run { plan: Some(name) } => {
            let plan = config.plan(&name)?;
            let outcome = config.run_plan(&config.dispatcher(), plan, Utc::now())?;
            report(&outcome);
        }
        Command::Run { plan: None } => {
            let thread_pool = ThreadPoolBuilder::new().build()?;
            config
                .run_all(&thread_pool, Utc::now())?
                .iter()
                .for_each(report);
        }
        Command::Cleanup => {
            let removed = config.cleanup()?;
            info!("Removed {} stale files", removed.len());
        }
        Command::Check => info!("Config is valid, {} plans", config.plans().len()),
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let res: Result<()> =
        BackupConfig::load(&args.config).and_then(|config| execute(&config, args.command));

    if let Err(e) = res {
        error!("{e}");
        exit(1);
    }
}
