//! Omnivore crawler main entry point
//!
//! This is the command-line interface for the Omnivore crawl engine.

use anyhow::{bail, Context};
use clap::Parser;
use omnivore_crawler::config::{load_config_with_hash, EngineConfig};
use omnivore_crawler::output::{
    load_session_report, print_statistics, write_markdown_summary, JsonLinesSink, MultiSink,
    SqliteSink,
};
use omnivore_crawler::{Session, SessionId, SessionReport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Omnivore: a polite, parallel crawler
///
/// Omnivore crawls outward from a set of seed addresses while respecting
/// robots.txt, per-origin rate limits and server backoff signals, streaming
/// one record per visited address to the configured outputs.
#[derive(Parser, Debug)]
#[command(name = "omnivore-crawler")]
#[command(version)]
#[command(about = "A polite, parallel crawler", long_about = None)]
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

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics of a stored session and exit
    #[arg(long, value_name = "SESSION_ID", conflicts_with = "dry_run")]
    stats: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if let Some(session_id) = &cli.stats {
        handle_stats(&config, session_id)?;
    } else {
        handle_crawl(config, config_hash).await?;
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
            0 => EnvFilter::new("omnivore_crawler=info,warn"),
            1 => EnvFilter::new("omnivore_crawler=debug,info"),
            2 => EnvFilter::new("omnivore_crawler=trace,debug"),
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

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &EngineConfig) {
    let crawler = &config.crawler;
    let politeness = &config.politeness;

    println!("=== Omnivore Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max depth: {}", crawler.max_depth);
    println!("  Workers: {}", crawler.max_workers);
    println!("  Request timeout: {}ms", crawler.request_timeout_ms);
    println!(
        "  Redirects: {} (max {})",
        if crawler.follow_redirects { "followed" } else { "recorded" },
        crawler.max_redirects
    );
    println!("  Respect robots.txt: {}", crawler.respect_robots);
    if let Some(deadline) = crawler.session_deadline_secs {
        println!("  Session deadline: {}s", deadline);
    }

    println!("\nPoliteness:");
    println!("  Minimum delay: {}ms", politeness.min_delay_ms);
    println!("  Max requests/sec: {}", politeness.max_requests_per_second);
    println!("  In-flight per origin: {}", politeness.in_flight_budget);
    println!(
        "  Backoff: {}ms x{} up to {}ms",
        politeness.backoff_base_ms, politeness.backoff_multiplier, politeness.backoff_ceiling_ms
    );
    println!("  Adaptive delay: {}", politeness.adaptive_delay);
    for entry in &politeness.overrides {
        println!("  Override: {}", entry.origin);
    }

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    print_output_path("Database", &config.output.database_path);
    print_output_path("JSON lines", &config.output.jsonl_path);
    print_output_path("Summary", &config.output.summary_path);

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

fn print_output_path(label: &str, path: &Option<PathBuf>) {
    match path {
        Some(path) => println!("  {}: {}", label, path.display()),
        None => println!("  {}: (disabled)", label),
    }
}

/// Handles the --stats mode: shows statistics of a stored session
fn handle_stats(config: &EngineConfig, session_id: &str) -> anyhow::Result<()> {
    let Some(database_path) = &config.output.database_path else {
        bail!("--stats needs output.database-path to be configured");
    };

    let session_id: SessionId = session_id
        .parse()
        .with_context(|| format!("Invalid session ID '{}'", session_id))?;

    println!("Database: {}\n", database_path.display());
    let report = load_session_report(database_path, &session_id)?;
    print_statistics(&report);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: EngineConfig, config_hash: String) -> anyhow::Result<()> {
    let mut sinks = MultiSink::new();

    if let Some(path) = &config.output.jsonl_path {
        let sink = JsonLinesSink::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        sinks.push(Arc::new(sink));
    }
    if let Some(path) = &config.output.database_path {
        let sink = SqliteSink::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        sinks.push(Arc::new(sink));
    }
    if sinks.is_empty() {
        tracing::warn!("No record outputs configured; records will only be counted");
    }

    let summary_path = config.output.summary_path.clone();
    let session = Session::new(config)?.with_config_hash(config_hash);
    tracing::info!("Session ID: {}", session.id());

    let handle = session.start(Arc::new(sinks));

    // Ctrl-C once drains, twice aborts
    let control = handle.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received, draining (press Ctrl-C again to abort)");
        control.drain();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second interrupt received, aborting");
            control.abort();
        }
    });

    let report = handle.wait().await.context("Crawl session failed")?;

    println!();
    print_statistics(&report);
    write_summary(&report, summary_path);

    Ok(())
}

fn write_summary(report: &SessionReport, path: Option<PathBuf>) {
    let Some(path) = path else {
        return;
    };

    match write_markdown_summary(report, &path) {
        Ok(()) => println!("\n✓ Summary written to: {}", path.display()),
        Err(e) => tracing::error!("Failed to write summary {}: {}", path.display(), e),
    }
}
