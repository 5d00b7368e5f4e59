//! Command-line front-end for the herald dispatcher
//!
//! - `send`: dispatch one job given on the command line
//! - `batch`: dispatch every job in a CSV file
//! - `check`: check that the transport can reach its service
//! - `config`: print the effective configuration

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use herald::{
    HeraldConfig,
    controller::{Herald, SHUTDOWN_BROADCAST, shutdown},
    jobs::read_batch_file,
    report,
};
use herald_common::{JobSpec, internal, logging};

/// Rate-limited outbound message dispatcher
#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(about = "Dispatch messages within the limits of a rate-limited service", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a RON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one message to one target, possibly several times
    Send {
        /// Target phone number, `+` followed by 7 to 15 digits
        target: String,

        /// Message to send
        message: String,

        /// Number of times to send the message
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,

        /// Seconds to wait between consecutive sends
        #[arg(short, long, default_value_t = 1.0)]
        delay: f64,
    },
    /// Send every job listed in a CSV file (target,message,count,delay)
    Batch {
        /// Path to the CSV file
        file: PathBuf,
    },
    /// Check that the transport is reachable
    Check,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let (config, path) = HeraldConfig::load(cli.config.as_deref(), |var| std::env::var(var).ok())
        .context("Failed to load configuration")?;
    match &path {
        Some(path) => internal!(level = DEBUG, path = %path.display(), "Loaded configuration"),
        None => internal!(level = DEBUG, "No configuration file found, using defaults"),
    }

    match cli.command {
        Commands::Config => {
            println!("{}", config.to_ron().context("Failed to render configuration")?);
        }
        Commands::Check => {
            let herald = Herald::new(config)?;
            herald.check().await.context("Transport health check failed")?;
            println!("Transport is reachable");
        }
        Commands::Send {
            target,
            message,
            count,
            delay,
        } => {
            let delay = JobSpec::delay_from_secs(delay)?;
            let job = JobSpec::new(&target, &message, count, delay)?;
            dispatch(config, vec![job], cli.json).await?;
        }
        Commands::Batch { file } => {
            let jobs = load_batch(&file)?;
            dispatch(config, jobs, cli.json).await?;
        }
    }

    Ok(())
}

fn load_batch(file: &Path) -> anyhow::Result<Vec<JobSpec>> {
    let batch = read_batch_file(file)
        .with_context(|| format!("Failed to read jobs from {}", file.display()))?;

    if !batch.skipped.is_empty() {
        eprintln!(
            "Skipped {} invalid row(s) in {}",
            batch.skipped.len(),
            file.display()
        );
    }
    if batch.jobs.is_empty() {
        anyhow::bail!("No valid jobs found in {}", file.display());
    }

    Ok(batch.jobs)
}

async fn dispatch(config: HeraldConfig, jobs: Vec<JobSpec>, json: bool) -> anyhow::Result<()> {
    let herald = Herald::new(config)?;

    let receiver = SHUTDOWN_BROADCAST.subscribe();
    let signals = tokio::spawn(shutdown());
    let report = herald.dispatch(jobs, receiver).await;
    signals.abort();

    let report = report.context("Dispatch run failed")?;
    if json {
        println!("{}", report::render_json(&report)?);
    } else {
        print!("{}", report::render_text(&report));
    }

    Ok(())
}
