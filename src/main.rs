//! Sitemap-Harvest main entry point
//!
//! This is the command-line interface for the Sitemap-Harvest crawler.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sitemap_harvest::config::{load_config_with_hash, load_rules, Config};
use sitemap_harvest::crawler::{FetchClient, FetchSettings, PolitenessGate, TaskEvent, TaskScheduler};
use sitemap_harvest::output::{format_progress, load_latest_statistics, print_statistics};
use sitemap_harvest::sitemap::SitemapResolver;
use sitemap_harvest::state::PageStatus;
use sitemap_harvest::storage::{SqliteSink, SqliteStorage};
use sitemap_harvest::TaskStatus;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Sitemap-Harvest: a polite sitemap crawler
///
/// Sitemap-Harvest expands a sitemap into page URLs, fetches every page while
/// respecting robots.txt and per-domain rate limits, and extracts fields
/// with CSS selector rules into a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "sitemap-harvest")]
#[command(version)]
#[command(about = "A polite sitemap crawler with CSS-selector extraction", long_about = None)]
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

    /// Load extraction rules from a separate TOML file instead of the config
    #[arg(long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Validate config and show what would be harvested without fetching
    #[arg(long, conflicts_with_all = ["resolve_only", "stats"])]
    dry_run: bool,

    /// Resolve the sitemap, print the page URLs and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    resolve_only: bool,

    /// Show statistics of the most recent task in the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "resolve_only"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(path) = &cli.rules {
        config.rules = load_rules(path)
            .with_context(|| format!("Failed to load rules from {}", path.display()))?;
        tracing::info!("Loaded {} rules from {}", config.rules.len(), path.display());
    }

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.resolve_only {
        handle_resolve_only(&config).await?;
    } else {
        handle_harvest(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitemap_harvest=info,warn"),
            1 => EnvFilter::new("sitemap_harvest=debug,info"),
            2 => EnvFilter::new("sitemap_harvest=trace,debug"),
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

/// Builds the gate and client shared by the resolver and the scheduler
fn build_shared(config: &Config) -> anyhow::Result<(Arc<PolitenessGate>, FetchClient)> {
    let client = FetchClient::new(config.task.max_redirects).context("Failed to build HTTP client")?;

    let mut gate = PolitenessGate::new(
        client.http().clone(),
        config.task.per_domain_concurrency as usize,
    );
    if let Some(fingerprint) = config.task.fingerprints.first() {
        gate = gate.with_user_agent(fingerprint.user_agent());
    }

    Ok((Arc::new(gate), client))
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) {
    let task = &config.task;

    println!("=== Sitemap-Harvest Dry Run ===\n");

    println!("Task Configuration:");
    if task.discover {
        println!("  Site (discovery): {}", task.sitemap_url);
    } else {
        println!("  Sitemap: {}", task.sitemap_url);
    }
    println!("  Follow nested sitemaps: {}", task.follow_nested);
    println!("  Max depth: {}", task.max_depth);
    println!("  Max pages: {}", task.max_pages);
    println!("  Concurrency: {} ({} per domain)", task.concurrency, task.per_domain_concurrency);
    println!("  Delay range: {}-{}ms", task.delay_min_ms, task.delay_max_ms);
    println!("  Timeout: {}ms", task.timeout_ms);
    println!("  Max retries: {}", task.max_retries);
    println!("  Respect robots.txt: {} (agent {})", task.respect_robots, task.robots_agent);

    println!("\nFingerprints ({}):", task.fingerprints.len());
    for fingerprint in &task.fingerprints {
        println!("  - {}", fingerprint.user_agent());
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Duplicate strategy: {}", config.output.duplicate_strategy.as_str());

    println!("\nRules ({}):", config.rules.len());
    for rule in &config.rules {
        println!(
            "  - {}: {} ({:?}{}{})",
            rule.name,
            rule.selector,
            rule.kind,
            if rule.multiple { ", multiple" } else { "" },
            if rule.required { ", required" } else { "" }
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

    match load_latest_statistics(&storage)? {
        Some(stats) => print_statistics(&stats),
        None => println!("No tasks found in database"),
    }

    Ok(())
}

/// Handles the --resolve-only mode: prints the page URLs of the sitemap
async fn handle_resolve_only(config: &Config) -> anyhow::Result<()> {
    let task = &config.task;
    let (gate, client) = build_shared(config)?;
    let root = Url::parse(&task.sitemap_url)?;

    let resolver = SitemapResolver::new(client, FetchSettings::from_task_config(task))
        .follow_nested(task.follow_nested);

    let resolution = if task.discover {
        resolver
            .resolve_site(&root, &gate, task.max_depth, task.max_pages)
            .await?
    } else {
        resolver.resolve(&root, task.max_depth, task.max_pages).await?
    };

    for entry in &resolution.entries {
        match &entry.lastmod {
            Some(lastmod) => println!("{}\t{}", entry.loc, lastmod),
            None => println!("{}", entry.loc),
        }
    }

    for branch in &resolution.branch_errors {
        eprintln!("error: {} (depth {}): {}", branch.url, branch.depth, branch.error);
    }

    eprintln!(
        "{} URLs from {} sitemaps ({} skipped by depth, {} nested not followed{})",
        resolution.len(),
        resolution.sitemaps_fetched,
        resolution.skipped_by_depth,
        resolution.skipped_nested,
        if resolution.truncated { ", truncated" } else { "" }
    );

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config) -> anyhow::Result<()> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open {}", config.output.database_path))?;
    let sink = Arc::new(SqliteSink::new(storage, config.output.duplicate_strategy));

    let (gate, client) = build_shared(&config)?;
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let scheduler = TaskScheduler::new(gate, client, sink).with_events(events_tx);

    tracing::info!(
        "Harvesting {} with {} rules",
        config.task.sitemap_url,
        config.rules.len()
    );

    let task = scheduler.schedule(config.task, config.rules)?;
    task.start()?;

    let reporter = tokio::spawn(async move {
        let mut parsed = 0u64;
        while let Some(event) = events_rx.recv().await {
            match event {
                TaskEvent::Progress(progress) => {
                    tracing::info!("{}", format_progress(&progress));
                }
                TaskEvent::Page(page) if page.status == PageStatus::Parsed => {
                    parsed += 1;
                    if parsed % 50 == 0 {
                        tracing::info!("{} pages parsed", parsed);
                    }
                }
                TaskEvent::Page(_) => {}
            }
        }
    });

    let interrupt = task.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after in-flight pages");
            if let Err(e) = interrupt.stop() {
                tracing::debug!("Stop ignored: {}", e);
            }
        }
    });

    let progress = task.wait().await;
    drop(scheduler);
    reporter.abort();

    tracing::info!("Task {} finished: {}", progress.task_id, format_progress(&progress));

    if progress.status == TaskStatus::Error {
        bail!(
            "Task failed: {}",
            progress.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}
