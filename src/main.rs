//! Curio main entry point
//!
//! This is the command-line interface for the curio archive harvester.

use clap::Parser;
use curio::config::load_config_with_hash;
use curio::pipeline::{print_run_summary, run_harvest};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Curio: a polite archive harvester
///
/// Curio collects normalized metadata and maximum-resolution images from
/// configured digital archives, respecting per-host rate limits and
/// resuming interrupted runs without duplicating work.
#[derive(Parser, Debug)]
#[command(name = "curio")]
#[command(version = "1.0.0")]
#[command(about = "A polite archive harvester", long_about = None)]
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

    /// Resume from previous harvest state (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh harvest, ignoring previous state
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be harvested without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the harvest index and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

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

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_harvest(config, &config_hash, !cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("curio=info,warn"),
            1 => EnvFilter::new("curio=debug,info"),
            2 => EnvFilter::new("curio=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows planned work
fn handle_dry_run(config: &curio::config::Config) {
    println!("=== Curio Dry Run ===\n");

    println!("Harvester Configuration:");
    println!("  Concurrency limit: {}", config.harvester.concurrency_limit);
    println!(
        "  Per-host min interval: {}ms",
        config.harvester.per_host_min_interval
    );
    println!("  Max retries: {}", config.harvester.max_retries);
    println!(
        "  Backoff: {}ms base, {}ms cap",
        config.harvester.backoff_base, config.harvester.backoff_cap
    );
    if let Some(deadline) = config.harvester.deadline {
        println!("  Deadline: {}s", deadline);
    }

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Directory: {}", config.output.output_dir);

    println!("\nArchives ({}):", config.archives.len());
    for archive in &config.archives {
        println!(
            "  - {} ({}): seed {}",
            archive.name,
            archive.kind.as_str(),
            archive.seed
        );
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would harvest {} archives into {}",
        config.archives.len(),
        config.output.output_dir
    );
}

/// Handles the --stats mode: shows statistics from the harvest index
fn handle_stats(config: &curio::config::Config) -> Result<(), Box<dyn std::error::Error>> {
    use curio::pipeline::print_index_statistics;
    use curio::storage::HarvestIndex;
    use std::path::Path;

    let db_path = Path::new(&config.output.output_dir).join("harvest.db");
    println!("Index: {}\n", db_path.display());

    let index = HarvestIndex::open(&db_path)?;
    let stats = index.statistics()?;
    print_index_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: curio::config::Config,
    config_hash: &str,
    resume: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if resume {
        tracing::info!("Starting harvest (resuming over previous state)");
    } else {
        tracing::info!("Starting fresh harvest (ignoring previous state)");
    }

    match run_harvest(config, config_hash, resume).await {
        Ok(summary) => {
            print_run_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
