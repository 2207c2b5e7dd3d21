//! Reel-Harvest main entry point
//!
//! This is the command-line interface for the Reel-Harvest catalogue crawler.

use anyhow::Context;
use clap::Parser;
use reel_harvest::config::{load_config_with_hash, Config};
use reel_harvest::crawler::HttpCoordinator;
use reel_harvest::output::{export_records, load_status, print_status, print_summary};
use reel_harvest::storage::{CheckpointStore, JsonCheckpointStore};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Reel-Harvest: a resumable movie catalogue crawler
///
/// Reel-Harvest pages through a listing endpoint, fetches every item's detail
/// page with a bounded pool of workers, and checkpoints progress so an
/// interrupted crawl resumes where it stopped.
#[derive(Parser, Debug)]
#[command(name = "reel-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable movie catalogue crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume from the checkpoint if one exists (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, ignoring any checkpoint
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show the effective settings without crawling
    #[arg(long, conflicts_with_all = ["status", "export"])]
    dry_run: bool,

    /// Show progress recorded in the checkpoint and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    status: bool,

    /// Rewrite the CSV export from the checkpoint and exit
    #[arg(long, conflicts_with_all = ["dry_run", "status"])]
    export: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.status {
        handle_status(&config)?;
    } else if cli.export {
        handle_export(&config)?;
    } else {
        handle_crawl(config, &config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("reel_harvest=info,warn"),
            1 => EnvFilter::new("reel_harvest=debug,info"),
            2 => EnvFilter::new("reel_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective settings
fn handle_dry_run(config: &Config) {
    println!("=== Reel-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Target records: {}", config.crawler.target);
    println!("  Workers: {}", config.crawler.workers);
    println!("  Page size: {}", config.crawler.page_size);
    println!(
        "  List delay: {}-{}ms",
        config.crawler.list_delay_min_ms, config.crawler.list_delay_max_ms
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);

    println!("\nSource:");
    println!("  Listing: {}", config.source.list_url);
    println!(
        "  Query: sort={} range={} tags={}",
        config.source.sort, config.source.range, config.source.tags
    );
    println!("  User agents: {}", config.source.user_agents.len());

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!("  Base delay: {}ms", config.retry.base_delay_ms);
    println!(
        "  Rate limit cooldown: {}ms",
        config.retry.rate_limit_cooldown_ms
    );
    println!(
        "  Global cooldown: {}ms after {} failed rounds",
        config.retry.global_cooldown_ms, config.retry.max_consecutive_failures
    );

    println!("\nOutput:");
    println!("  Checkpoint: {}", config.output.checkpoint_path);
    println!("  Export: {}", config.output.export_path);
    println!("  Checkpoint every: {} records", config.output.checkpoint_every);
    if let Some(every) = config.output.snapshot_every {
        println!("  Snapshot every: {} records", every);
    }
    if let Some(seed) = &config.output.seed_path {
        println!("  Seed table: {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --status mode: shows progress from the checkpoint
fn handle_status(config: &Config) -> anyhow::Result<()> {
    println!("Checkpoint: {}\n", config.output.checkpoint_path);

    let status = load_status(Path::new(&config.output.checkpoint_path))
        .context("Failed to read checkpoint")?;

    match status {
        Some(status) => print_status(&status),
        None => println!("No checkpoint found; nothing has been collected yet."),
    }

    Ok(())
}

/// Handles the --export mode: rewrites the CSV from the checkpoint
fn handle_export(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Collected Records ===\n");
    println!("Checkpoint: {}", config.output.checkpoint_path);
    println!("Output: {}", config.output.export_path);
    println!();

    let store = JsonCheckpointStore::new(&config.output.checkpoint_path, "");
    let checkpoint = store
        .load()
        .context("Failed to read checkpoint")?
        .with_context(|| format!("No checkpoint at {}", config.output.checkpoint_path))?;

    let export_path = Path::new(&config.output.export_path);
    export_records(export_path, &checkpoint.collected)
        .with_context(|| format!("Failed to write {}", export_path.display()))?;

    println!(
        "✓ Exported {} records to: {}",
        checkpoint.collected.len(),
        config.output.export_path
    );

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous checkpoint)");
    } else {
        tracing::info!("Starting crawl (will resume from checkpoint if present)");
    }

    let mut coordinator = HttpCoordinator::from_config(config, config_hash, fresh)?;

    // Ctrl-C stops the crawl at the next safe point
    let cancel = coordinator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, saving progress and stopping");
            cancel.cancel();
        }
    });

    match coordinator.run().await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
