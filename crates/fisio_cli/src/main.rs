//! Command-line entry point for the local store.
//!
//! # Responsibility
//! - Own the store for the lifetime of one command.
//! - Expose health check, seeding, stats and snapshot export/import.

use clap::{Parser, Subcommand};
use fisio_core::config::{ENV_DATA_DIR, ENV_LOG_LEVEL};
use fisio_core::{CoreConfig, FisioStore, SeedOutcome};
use log::{info, warn};
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fisio")]
#[command(about = "Local data store of the physiotherapy practice tool")]
struct Cli {
    /// Directory holding the database and logs (overrides FISIO_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// trace|debug|info|warn|error (overrides FISIO_LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print core liveness and version
    Ping,
    /// Write default records into never-populated collections
    Seed,
    /// Print record counts per collection
    Stats,
    /// Write a snapshot of every collection as JSON
    Export {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Replace collections with the contents of a snapshot file
    Import { file: PathBuf },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run(Cli::parse()).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    if let Commands::Ping = cli.command {
        println!("fisio_core ping={}", fisio_core::ping());
        println!("fisio_core version={}", fisio_core::core_version());
        return Ok(());
    }

    let config = resolve_config(&cli)?;
    if let Err(err) = fisio_core::init_logging_from_config(&config) {
        eprintln!("warning: logging disabled: {err}");
    }
    let store = FisioStore::open(&config).await?;

    match cli.command {
        Commands::Ping => {}
        Commands::Seed => {
            for (collection, outcome) in store.seed_all().await? {
                match outcome {
                    SeedOutcome::Seeded { records } => {
                        println!("{collection}: seeded {records} records")
                    }
                    SeedOutcome::AlreadyPresent => println!("{collection}: already present"),
                }
            }
        }
        Commands::Stats => {
            for stat in store.collection_stats().await? {
                println!("{}: {}", stat.collection, stat.records);
            }
            let assessments = store.assessments.list_all().await?;
            println!("scaleResults: {}", assessments.len());
        }
        Commands::Export { out } => {
            let text = store.snapshots.export_json().await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    info!("event=cli_export module=cli status=ok path={}", path.display());
                }
                None => println!("{text}"),
            }
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)?;
            let report = store.snapshots.import_json(&text).await.map_err(|err| {
                warn!("event=cli_import module=cli status=error error={err}");
                err
            })?;
            println!("imported: {}", report.applied.join(", "));
        }
    }
    Ok(())
}

/// Layers command-line flags over environment configuration.
fn resolve_config(cli: &Cli) -> Result<CoreConfig, Box<dyn Error>> {
    let data_dir = match &cli.data_dir {
        Some(dir) if dir.is_relative() => Some(std::env::current_dir()?.join(dir)),
        other => other.clone(),
    };
    let log_level = cli.log_level.clone();

    let config = CoreConfig::from_lookup(|key| match key {
        ENV_DATA_DIR if data_dir.is_some() => {
            data_dir.as_ref().map(|dir| dir.display().to_string())
        }
        ENV_LOG_LEVEL if log_level.is_some() => log_level.clone(),
        other => std::env::var(other).ok(),
    })?;
    Ok(config)
}
