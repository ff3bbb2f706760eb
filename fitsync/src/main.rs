//! fitsync - command line entry point
//!
//! Exit status is non-zero only when a run could not be set up (config,
//! database connection, BioStar login, batch fetch). Per-record failures are
//! reported in the summary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fitsync::biostar::{BioStarClient, Credentials, DirectoryService};
use fitsync::photo::PhotoResolver;
use fitsync::source::{OdbcRecordStore, RecordStore};
use fitsync::sync::{self, SyncOrchestrator};
use fitsync_common::config::{resolve_config_path, Config};
use fitsync_common::logging::{init_logging, log_section};
use tracing::{info, warn};

/// Command-line arguments for fitsync
#[derive(Parser, Debug)]
#[command(name = "fitsync")]
#[command(about = "Sync Opera Fitness clients and photos into BioStar 2")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "FITSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long, env = "FITSYNC_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Push one batch of pending clients to BioStar (default)
    Sync {
        /// Records to process in this run
        #[arg(short, long)]
        batch_size: Option<u32>,
    },
    /// Print the number of clients still pending
    Count,
    /// Check database and BioStar connectivity
    Check,
    /// List BioStar user groups
    Groups,
    /// Show how the next batch would be mapped, without sending anything
    Preview {
        #[arg(short, long)]
        batch_size: Option<u32>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref())?;
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    init_logging(&config.logging, args.log_level.as_deref())?;

    info!(
        "Starting fitsync v{} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("FITSYNC_BUILD")
    );
    info!("Config: {}", config_path.display());

    match args.command.unwrap_or(Command::Sync { batch_size: None }) {
        Command::Sync { batch_size } => run_sync(config, batch_size),
        Command::Count => run_count(&config),
        Command::Check => run_check(&config),
        Command::Groups => run_groups(&config),
        Command::Preview { batch_size } => run_preview(&config, batch_size),
    }
}

fn run_sync(mut config: Config, batch_size: Option<u32>) -> Result<()> {
    if let Some(size) = batch_size {
        anyhow::ensure!(size > 0, "--batch-size must be at least 1");
        config.sync.batch_size = size;
    }

    let store = OdbcRecordStore::connect(&config.source).context("Failed to connect to source")?;
    let client = BioStarClient::new(&config.remote)?;

    let mut orchestrator = SyncOrchestrator::new(
        store,
        client,
        PhotoResolver::new(&config.photos),
        Credentials::from_config(&config.remote),
        config.sync.clone(),
    );
    orchestrator.run()?;
    Ok(())
}

fn run_count(config: &Config) -> Result<()> {
    let mut store =
        OdbcRecordStore::connect(&config.source).context("Failed to connect to source")?;
    let count = store.fetch_count();
    store.close();

    let count = count?;
    info!("Unsynced records: {}", count);
    println!("{}", count);
    Ok(())
}

fn run_check(config: &Config) -> Result<()> {
    log_section("CONNECTIVITY CHECK");

    let mut store =
        OdbcRecordStore::connect(&config.source).context("Failed to connect to source")?;
    let probe = store.probe();
    store.close();
    probe.context("Source probe query failed")?;
    info!("Source database: OK");

    let client = BioStarClient::new(&config.remote)?;
    let mut session = client
        .authenticate(&Credentials::from_config(&config.remote))
        .context("BioStar login failed")?;
    client.logout(&mut session);
    info!("BioStar API: OK");
    Ok(())
}

fn run_groups(config: &Config) -> Result<()> {
    let client = BioStarClient::new(&config.remote)?;
    let mut session = client
        .authenticate(&Credentials::from_config(&config.remote))
        .context("BioStar login failed")?;

    let groups = client.list_user_groups(&session);
    client.logout(&mut session);

    let groups = groups?;
    if groups.is_empty() {
        warn!("No user groups defined on the server");
    }
    for group in groups {
        println!("{}\t{}", group.id, group.name);
    }
    Ok(())
}

fn run_preview(config: &Config, batch_size: Option<u32>) -> Result<()> {
    let limit = batch_size.unwrap_or(config.sync.batch_size).max(1);

    let mut store =
        OdbcRecordStore::connect(&config.source).context("Failed to connect to source")?;
    let entries = sync::preview(&mut store, &PhotoResolver::new(&config.photos), limit);
    store.close();

    let entries = entries?;
    log_section("SYNC PREVIEW");
    for entry in &entries {
        match entry.skip_reason {
            Some(reason) => info!("{} -> skipped ({})", entry.code, reason),
            None => info!(
                "{} -> user_id={} name={:?} department={:?} photo={}",
                entry.code,
                entry.client.numeric_id,
                entry.client.name,
                entry.client.department,
                if entry.has_photo { "yes" } else { "no" }
            ),
        }
    }
    info!("{} records previewed", entries.len());
    Ok(())
}
