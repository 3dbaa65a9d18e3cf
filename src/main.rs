//! Match-Spider main entry point
//!
//! This is the command-line interface for the Match-Spider player/match crawler.

use anyhow::Context;
use clap::Parser;
use match_spider::config::{load_config_with_hash, Config};
use match_spider::crawler::{run_crawl, stop_channel};
use match_spider::output::{load_statistics, print_report, print_statistics};
use match_spider::storage::open_store;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Match-Spider: a bounded-degree crawler for player/match graphs
///
/// Match-Spider downloads the match history of a set of seed accounts,
/// fetches every match record, and expands to the other participants of
/// those matches for a bounded number of rounds while respecting the
/// remote API's rate limits.
#[derive(Parser, Debug)]
#[command(name = "match-spider")]
#[command(version = "1.0.0")]
#[command(about = "A bounded-degree player/match graph crawler", long_about = None)]
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

    /// Override the configured crawl degree (at least 1)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    degree: Option<u32>,

    /// Start a new run, ignoring an interrupted run's progress
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(degree) = cli.degree {
        config.crawler.degree = degree;
    }

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("match_spider=info,warn"),
            1 => EnvFilter::new("match_spider=debug,info"),
            2 => EnvFilter::new("match_spider=trace,debug"),
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

/// Handles the --dry-run mode: shows the resolved configuration and seeds
fn handle_dry_run(config: &Config) {
    println!("=== Match-Spider Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!(
        "  Queue filter: {}",
        config
            .api
            .queue
            .map_or_else(|| "none".to_string(), |q| q.to_string())
    );
    println!(
        "  Season filter: {}",
        config
            .api
            .season
            .map_or_else(|| "none".to_string(), |s| s.to_string())
    );
    println!("  Request timeout: {}s", config.api.request_timeout_secs);

    println!("\nRate Limits ({}):", config.rate_limits.len());
    for window in &config.rate_limits {
        println!(
            "  - {} calls / {}s",
            window.max_calls, window.window_secs
        );
    }

    println!("\nCrawler:");
    println!("  Degree: {}", config.crawler.degree);
    println!("  Workers: {}", config.crawler.effective_workers());
    println!(
        "  Retries: {} (delay {}ms, max {}ms)",
        config.crawler.max_retries,
        config.crawler.retry_delay_ms,
        config.crawler.max_retry_delay_ms
    );
    println!("  Max pages per account: {}", config.crawler.max_pages);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nSeeds:");
    println!("  Account ids: {}", config.seeds.accounts.len());
    println!("  Player names (resolved at crawl time): {}", config.seeds.summoners.len());
    for name in &config.seeds.summoners {
        println!("    * {}", name);
    }
    println!("  Seed files: {}", config.seeds.seed_files.len());
    for file in &config.seeds.seed_files {
        match match_spider::api::load_seed_file(Path::new(file)) {
            Ok(accounts) => println!("    * {} ({} accounts)", file, accounts.len()),
            Err(e) => println!("    * {} (unreadable: {})", file, e),
        }
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let store = open_store(Path::new(&config.output.database_path))
        .context("failed to open the store")?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring interrupted runs)");
    } else {
        tracing::info!("Starting crawl (will resume if an interrupted run exists)");
    }

    let (stop_handle, stop_signal) = stop_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            stop_handle.stop();
        }
    });

    let report = run_crawl(config, fresh, stop_signal)
        .await
        .context("crawl failed")?;
    print_report(&report);

    Ok(())
}
