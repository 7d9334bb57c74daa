//! wp-harvest main entry point
//!
//! This is the command-line interface for the wp-harvest article and
//! comment-thread harvester.

use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use wp_harvest::config::{load_config_with_hash, Config};
use wp_harvest::crawler::{months_in_range, run_crawl, CrawlMode, CrawlOptions, CrawlReport};
use wp_harvest::output::{load_statistics, print_statistics};
use wp_harvest::storage::SqliteStorage;

/// wp-harvest: a resumable WordPress article and comment harvester
///
/// wp-harvest walks the monthly archives of a WordPress site, fetches every
/// article with all of its comment pages, and writes each article with its
/// reconstructed comment thread to a plain-text corpus. Progress is kept in
/// SQLite, so an interrupted run picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "wp-harvest")]
#[command(version)]
#[command(about = "A resumable WordPress article and comment harvester", long_about = None)]
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

    /// Only walk archive pages and register articles
    #[arg(long, conflicts_with = "scrape_only")]
    discover_only: bool,

    /// Only scrape articles already in the progress store
    #[arg(long, conflicts_with = "discover_only")]
    scrape_only: bool,

    /// Move failed articles under the retry budget back to pending first
    #[arg(long)]
    retry_failed: bool,

    /// Scrape at most N articles in this run
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the progress store and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

impl Cli {
    fn options(&self) -> CrawlOptions {
        let mode = if self.discover_only {
            CrawlMode::DiscoverOnly
        } else if self.scrape_only {
            CrawlMode::ScrapeOnly
        } else {
            CrawlMode::Full
        };
        CrawlOptions {
            mode,
            retry_failed: self.retry_failed,
            limit: self.limit,
        }
    }
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
        handle_dry_run(&config, &cli.options());
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, &config_hash, cli.options()).await?;
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
            0 => EnvFilter::new("wp_harvest=info,warn"),
            1 => EnvFilter::new("wp_harvest=debug,info"),
            2 => EnvFilter::new("wp_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, options: &CrawlOptions) {
    let crawler = &config.crawler;
    let end = crawler.effective_end_date();
    let months = months_in_range(crawler.start_date, end);

    println!("=== wp-harvest Dry Run ===\n");

    println!("Site:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  User agent: {}", config.site.user_agent);

    println!("\nCrawl Window:");
    println!(
        "  From {} to {} ({} archive months)",
        crawler.start_date,
        end,
        months.len()
    );
    if let (Some(&(y1, m1)), Some(&(y2, m2))) = (months.first(), months.last()) {
        let base = config.site.base_url.trim_end_matches('/');
        println!("  First listing: {}/{:04}/{:02}/", base, y1, m1);
        println!("  Last listing: {}/{:04}/{:02}/", base, y2, m2);
    }

    println!("\nPoliteness:");
    println!(
        "  Request delay: {:.2}s (process-wide)",
        crawler.request_delay_seconds
    );
    println!("  Timeout: {}s", crawler.timeout_seconds);
    println!(
        "  Max retries: {} (backoff capped at {:.0}s)",
        crawler.max_retries, crawler.backoff_cap_seconds
    );
    println!("  Workers: {}", crawler.worker_count);

    println!("\nThreads:");
    println!("  Max comment depth: {}", crawler.max_comment_depth);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Corpus: {}", config.output.corpus_dir);

    println!("\nRun:");
    println!("  Mode: {:?}", options.mode);
    if options.retry_failed {
        println!("  Failed articles would be reset to pending");
    }
    if let Some(limit) = options.limit {
        println!("  At most {} articles", limit);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the progress store
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: &str,
    options: CrawlOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Harvesting {} from {} to {}",
        config.site.base_url,
        config.crawler.start_date,
        config.crawler.effective_end_date()
    );

    match run_crawl(config, config_hash, options).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

fn print_report(report: &CrawlReport) {
    println!();
    println!("Run {} {}", report.run_id, report.status.to_db_string());
    if let Some(discovery) = &report.discovery {
        println!(
            "  Discovery: {} months scanned, {} already complete, {} new articles",
            discovery.months_scanned, discovery.months_skipped, discovery.new_articles
        );
    }
    if let Some(schedule) = &report.schedule {
        println!(
            "  This run: {} scraped, {} failed, {} unavailable, {} comments",
            schedule.scraped, schedule.failed, schedule.unavailable, schedule.comments_emitted
        );
    }
    println!();
    print_statistics(&report.statistics);
}
