//! Blog-Sentinel main entry point
//!
//! This is the command-line interface for the Blog-Sentinel scan engine.

use anyhow::Context;
use blog_sentinel::config::{load_config_with_hash, Config};
use blog_sentinel::extraction::{ContentExtractor, PreprocessClient};
use blog_sentinel::scan::Sweep;
use blog_sentinel::storage::{open_storage, Storage};
use blog_sentinel::{Dispatcher, ScanOrchestrator, SweepScheduler};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Blog-Sentinel: threat-intel blog scanner
///
/// Blog-Sentinel watches registered security blogs for new articles,
/// extracts their content and enriches it into intelligence reports with
/// LLM providers. Without a mode flag it runs the sweep scheduler until
/// interrupted.
#[derive(Parser, Debug)]
#[command(name = "blog-sentinel")]
#[command(version = "0.1.0")]
#[command(about = "Threat-intel blog scan engine", long_about = None)]
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

    /// Validate config and print it without touching the database
    #[arg(long, group = "mode")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, group = "mode")]
    stats: bool,

    /// Register a parent blog URL and exit
    #[arg(long, value_name = "URL", group = "mode")]
    add_parent: Option<String>,

    /// Scan interval for --add-parent (defaults to articles.default-scan-interval-hours)
    #[arg(long, value_name = "HOURS", requires = "add_parent")]
    interval_hours: Option<u32>,

    /// Scan one parent now, regardless of its schedule
    #[arg(long, value_name = "UID", group = "mode")]
    scan_parent: Option<String>,

    /// Run one sweep now: parents, retry, pending or stuck
    #[arg(long, value_name = "SWEEP", group = "mode")]
    run_sweep: Option<Sweep>,

    /// List registered parent uids, newest first
    #[arg(long, group = "mode")]
    list_parents: bool,

    /// List the articles discovered under a parent
    #[arg(long, value_name = "UID", group = "mode")]
    children: Option<String>,

    /// Check whether the content extraction service answers
    #[arg(long, group = "mode")]
    check_health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.list_parents {
        handle_list_parents(&config)?;
    } else if let Some(uid) = &cli.children {
        handle_children(&config, uid)?;
    } else if let Some(url) = &cli.add_parent {
        handle_add_parent(&config, url, cli.interval_hours)?;
    } else if let Some(uid) = &cli.scan_parent {
        handle_scan_parent(&config, uid).await?;
    } else if let Some(sweep) = cli.run_sweep {
        handle_run_sweep(&config, sweep).await?;
    } else if cli.check_health {
        handle_check_health(&config).await?;
    } else {
        handle_run(&config).await?;
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
            0 => EnvFilter::new("blog_sentinel=info,warn"),
            1 => EnvFilter::new("blog_sentinel=debug,info"),
            2 => EnvFilter::new("blog_sentinel=trace,debug"),
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

fn open_database(config: &Config) -> anyhow::Result<Arc<dyn Storage>> {
    let path = Path::new(&config.storage.database_path);
    let storage = open_storage(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(Arc::new(storage))
}

/// Wires storage, providers and the extraction client together
fn build_orchestrator(config: &Config) -> anyhow::Result<Arc<ScanOrchestrator>> {
    let storage = open_database(config)?;
    let dispatcher = Arc::new(Dispatcher::from_config(&config.providers)?);
    if config.providers.is_empty() {
        tracing::warn!("No providers configured; classification and enrichment will fail");
    }
    let extractor: Arc<dyn ContentExtractor> = Arc::new(PreprocessClient::new(&config.extraction)?);

    Ok(Arc::new(ScanOrchestrator::new(
        storage, dispatcher, extractor, config,
    )?))
}

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &Config) {
    println!("=== Blog-Sentinel Dry Run ===\n");

    println!("Scheduler:");
    println!("  Enabled: {}", config.scheduler.enabled);
    println!(
        "  Due-parent sweep: every {}s ({} parents at a time)",
        config.scheduler.parent_scan_interval_secs, config.scheduler.parent_concurrency
    );
    println!(
        "  Retry sweep: every {}s",
        config.scheduler.retry_failed_interval_secs
    );
    println!(
        "  Pending sweep: every {}s",
        config.scheduler.process_pending_interval_secs
    );
    println!(
        "  Stuck-reset sweep: every {}s",
        config.scheduler.reset_stuck_interval_secs
    );
    println!(
        "  Health check: every {}s",
        config.scheduler.health_check_interval_secs
    );

    println!("\nArticles:");
    println!("  Max failures: {}", config.articles.max_failure_count);
    println!(
        "  Stuck timeout: {} minutes",
        config.articles.stuck_timeout_minutes
    );
    println!(
        "  Default scan interval: {} hours",
        config.articles.default_scan_interval_hours
    );

    println!("\nDiscovery:");
    println!(
        "  Max pages / URLs: {} / {}",
        config.discovery.max_pages, config.discovery.max_urls
    );
    println!(
        "  URLs per classification call: {}",
        config.discovery.max_urls_per_llm_call
    );
    println!(
        "  Excluded keywords: {}",
        config.discovery.excluded_keywords.join(", ")
    );
    println!(
        "  Classifier provider: {}",
        config.discovery.classifier_provider
    );

    println!("\nEnrichment:");
    println!(
        "  Indicators: {}, techniques: {}, chunks: {}",
        config.enrichment.indicator_provider,
        config.enrichment.technique_provider,
        config.enrichment.chunk_provider
    );

    println!("\nExtraction service: {}", config.extraction.base_url);
    println!("Database: {}", config.storage.database_path);

    println!("\nProviders ({}):", config.providers.len());
    for provider in &config.providers {
        println!(
            "  - {} ({} at {}, {} concurrent, {}s timeout)",
            provider.name,
            provider.model,
            provider.endpoint,
            provider.max_concurrent_requests,
            provider.timeout_secs
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use blog_sentinel::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.storage.database_path);

    let storage = open_database(config)?;
    let stats = load_statistics(storage.as_ref(), chrono::Utc::now())?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --list-parents mode
fn handle_list_parents(config: &Config) -> anyhow::Result<()> {
    let storage = open_database(config)?;
    let parents = storage.list_parents()?;

    println!("Parents ({}):", parents.len());
    for parent in parents {
        println!(
            "  {}  {}  every {}h, next scan {}",
            parent.uid, parent.url, parent.scan_interval_hours, parent.next_scan_at
        );
    }

    Ok(())
}

/// Handles the --children mode
fn handle_children(config: &Config, parent_uid: &str) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let children = orchestrator.child_articles(parent_uid)?;

    println!("Articles under {} ({}):", parent_uid, children.len());
    for (uid, url) in children {
        println!("  {}  {}", uid, url);
    }

    Ok(())
}

/// Handles the --add-parent mode
fn handle_add_parent(config: &Config, url: &str, interval_hours: Option<u32>) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let parent = orchestrator.register_parent(url, interval_hours)?;

    println!("✓ Parent {} registered as {}", parent.url, parent.uid);
    println!(
        "  Scans every {} hours, next scan at {}",
        parent.scan_interval_hours, parent.next_scan_at
    );

    Ok(())
}

/// Handles the --scan-parent mode
async fn handle_scan_parent(config: &Config, parent_uid: &str) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let summary = orchestrator.scan_parent(parent_uid).await?;

    println!("✓ Scan of {} complete", parent_uid);
    println!("  Candidates: {}", summary.candidates);
    println!("  Articles: {}", summary.articles);
    println!(
        "  Succeeded / failed / skipped: {} / {} / {}",
        summary.succeeded, summary.failed, summary.skipped
    );

    Ok(())
}

/// Handles the --run-sweep mode
async fn handle_run_sweep(config: &Config, sweep: Sweep) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let summary = orchestrator.run_sweep(sweep).await?;

    println!(
        "✓ Sweep '{}' complete: {} examined, {} succeeded, {} failed",
        sweep, summary.examined, summary.succeeded, summary.failed
    );

    Ok(())
}

/// Handles the --check-health mode
async fn handle_check_health(config: &Config) -> anyhow::Result<()> {
    let extractor = PreprocessClient::new(&config.extraction)?;

    if extractor.is_healthy().await {
        println!("✓ Extraction service at {} is healthy", config.extraction.base_url);
        Ok(())
    } else {
        anyhow::bail!(
            "extraction service at {} is not responding",
            config.extraction.base_url
        )
    }
}

/// Runs the sweep scheduler until Ctrl-C
async fn handle_run(config: &Config) -> anyhow::Result<()> {
    if !config.scheduler.enabled {
        tracing::warn!("Scheduler is disabled in the configuration; nothing to run");
        return Ok(());
    }

    let orchestrator = build_orchestrator(config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = SweepScheduler::new(orchestrator, &config.scheduler).spawn(shutdown_rx);
    tracing::info!("Scheduler started, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Sweep task ended abnormally: {}", e);
        }
    }

    tracing::info!("Scheduler stopped");
    Ok(())
}
