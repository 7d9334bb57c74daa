//! Crawler coordinator - main crawl orchestration logic
//!
//! This module ties the crawl together:
//! - Opening the progress store and recording the run
//! - Building the shared fetcher, extractor and writer
//! - Running discovery, then the article scheduler
//! - Handling Ctrl-C through a cooperative stop signal
//! - Reporting final counts and accumulated data quality warnings

use crate::config::Config;
use crate::crawler::article::ArticleProcessor;
use crate::crawler::discovery::{DiscoveryDriver, DiscoveryReport};
use crate::crawler::extract::{HtmlExtractor, WordPressExtractor};
use crate::crawler::fetcher::{
    HttpTransport, PolitenessGate, RateLimitedFetcher, ReqwestTransport, RetryPolicy,
};
use crate::crawler::scheduler::{ScheduleReport, Scheduler};
use crate::output::{load_statistics, ArticleWriter, CrawlStatistics, PlainTextWriter};
use crate::state::ArticleStatus;
use crate::storage::{lock_storage, open_storage, RunStatus, SharedStorage, Storage};
use crate::{ConfigError, HarvestError};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use url::Url;

/// Which phases a crawl runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrawlMode {
    /// Discovery followed by article scraping
    #[default]
    Full,
    DiscoverOnly,
    ScrapeOnly,
}

impl CrawlMode {
    pub fn discovers(&self) -> bool {
        matches!(self, Self::Full | Self::DiscoverOnly)
    }

    pub fn scrapes(&self) -> bool {
        matches!(self, Self::Full | Self::ScrapeOnly)
    }
}

/// Per-invocation crawl options
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    pub mode: CrawlMode,

    /// Move failed articles still under the retry budget back to pending
    pub retry_failed: bool,

    /// Process at most this many articles
    pub limit: Option<usize>,
}

/// Outcome of a crawl invocation
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub run_id: i64,
    pub status: RunStatus,
    pub discovery: Option<DiscoveryReport>,
    pub schedule: Option<ScheduleReport>,

    /// Failed articles reset to pending before scraping
    pub retried: usize,

    /// Store-wide totals after the run, including earlier runs
    pub statistics: CrawlStatistics,
}

/// Requests a cooperative stop of a running crawl
#[derive(Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.0.send(true);
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    config_hash: String,
    storage: SharedStorage,
    fetcher: RateLimitedFetcher,
    extractor: Arc<dyn HtmlExtractor>,
    writer: Arc<dyn ArticleWriter>,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl Coordinator {
    /// Creates a coordinator fetching over HTTP and writing text files
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash of the configuration file, stored on the run
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(HarvestError)` - Failed to open the store or build the client
    pub fn new(config: Config, config_hash: &str) -> Result<Self, HarvestError> {
        let transport = ReqwestTransport::new(&config.site.user_agent, config.crawler.timeout())?;
        let writer = PlainTextWriter::new(&config.output.corpus_dir);
        Self::with_components(config, config_hash, Arc::new(transport), Arc::new(writer))
    }

    /// Creates a coordinator over an explicit transport and writer
    pub fn with_components(
        config: Config,
        config_hash: &str,
        transport: Arc<dyn HttpTransport>,
        writer: Arc<dyn ArticleWriter>,
    ) -> Result<Self, HarvestError> {
        let base_url = Url::parse(&config.site.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.site.base_url, e)))?;
        let extractor = WordPressExtractor::new(base_url)?;

        let storage = open_storage(Path::new(&config.output.database_path))?;

        let gate = Arc::new(PolitenessGate::new(config.crawler.request_delay()));
        let policy = RetryPolicy {
            max_retries: config.crawler.max_retries,
            base_delay: config.crawler.request_delay(),
            max_backoff: config.crawler.backoff_cap(),
        };
        let fetcher = RateLimitedFetcher::new(transport, gate, policy);

        let (stop_tx, stop_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            config_hash: config_hash.to_string(),
            storage: Arc::new(Mutex::new(storage)),
            fetcher,
            extractor: Arc::new(extractor),
            writer,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop_tx))
    }

    pub fn storage(&self) -> SharedStorage {
        Arc::clone(&self.storage)
    }

    fn stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Runs one crawl invocation against the progress store
    ///
    /// A run left `running` by a crashed process is marked interrupted; its
    /// work is picked up from the articles still pending.
    pub async fn run(&self, options: &CrawlOptions) -> Result<CrawlReport, HarvestError> {
        let (run_id, retried) = {
            let mut storage = lock_storage(&self.storage)?;

            if let Some(previous) = storage.get_latest_run()? {
                if previous.status == RunStatus::Running {
                    tracing::warn!(
                        "Run {} did not finish cleanly; resuming from the progress store",
                        previous.id
                    );
                    storage.finish_run(previous.id, RunStatus::Interrupted)?;
                }
                if previous.config_hash != self.config_hash {
                    tracing::info!("Configuration changed since run {}", previous.id);
                }
            }

            let run_id = storage.create_run(&self.config_hash)?;

            // Articles get as many attempts as a single request does
            let retried = if options.retry_failed {
                let budget = self.config.crawler.max_retries.saturating_add(1);
                storage.reset_failed_articles(budget)?
            } else {
                0
            };
            (run_id, retried)
        };

        tracing::info!("Starting crawl run {} ({:?})", run_id, options.mode);
        if retried > 0 {
            tracing::info!("Reset {} failed articles to pending", retried);
        }

        let phases = self.run_phases(options).await;

        let (discovery, schedule) = match phases {
            Ok(reports) => reports,
            Err(e) => {
                tracing::error!("Crawl run {} failed: {}", run_id, e);
                if let Ok(mut storage) = lock_storage(&self.storage) {
                    let _ = storage.finish_run(run_id, RunStatus::Failed);
                }
                return Err(e);
            }
        };

        let status = if self.stopped() {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };

        let statistics = {
            let mut storage = lock_storage(&self.storage)?;
            storage.finish_run(run_id, status)?;
            load_statistics(&*storage)?
        };

        tracing::info!(
            "Run {} {}: {} pending, {} scraped, {} failed, {} unavailable, {} data quality warnings",
            run_id,
            status.to_db_string(),
            statistics.count(ArticleStatus::Pending),
            statistics.count(ArticleStatus::Scraped),
            statistics.count(ArticleStatus::Failed),
            statistics.count(ArticleStatus::Unavailable),
            statistics.total_warnings()
        );

        Ok(CrawlReport {
            run_id,
            status,
            discovery,
            schedule,
            retried,
            statistics,
        })
    }

    async fn run_phases(
        &self,
        options: &CrawlOptions,
    ) -> Result<(Option<DiscoveryReport>, Option<ScheduleReport>), HarvestError> {
        let crawler = &self.config.crawler;

        let discovery = if options.mode.discovers() {
            let driver = DiscoveryDriver::new(
                self.fetcher.clone(),
                Arc::clone(&self.extractor),
                Arc::clone(&self.storage),
                &self.config.site.base_url,
                (crawler.start_date, crawler.effective_end_date()),
                crawler.max_archive_pages,
                self.stop_rx.clone(),
            );
            let report = driver.run().await?;
            tracing::info!(
                "Discovery: {} months scanned, {} skipped, {} new articles",
                report.months_scanned,
                report.months_skipped,
                report.new_articles
            );
            Some(report)
        } else {
            None
        };

        if !options.mode.scrapes() || self.stopped() {
            return Ok((discovery, None));
        }

        let processor = Arc::new(ArticleProcessor::new(
            self.fetcher.clone(),
            Arc::clone(&self.extractor),
            Arc::clone(&self.writer),
            Arc::clone(&self.storage),
            crawler.max_comment_depth,
        ));
        let scheduler = Scheduler::new(
            processor,
            Arc::clone(&self.storage),
            crawler.worker_count as usize,
            crawler.claim_batch_size,
            options.limit,
            self.stop_rx.clone(),
        );
        let schedule = scheduler.run().await?;
        tracing::info!(
            "Scraping: {} attempted, {} scraped, {} failed, {} unavailable, {} comments",
            schedule.attempted,
            schedule.scraped,
            schedule.failed,
            schedule.unavailable,
            schedule.comments_emitted
        );

        Ok((discovery, Some(schedule)))
    }
}

/// Runs the main crawl operation
///
/// This function orchestrates the entire crawl process:
///
/// 1. Open the progress store and record a new run
/// 2. Install a Ctrl-C handler that requests a graceful stop
/// 3. Walk monthly archives and register new articles
/// 4. Process pending articles through the worker pool
/// 5. Mark the run completed or interrupted and report totals
///
/// A second Ctrl-C exits immediately; the store stays consistent since
/// every write is a single transaction.
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file
/// * `options` - Mode, retry and limit options
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl finished or was stopped cleanly
/// * `Err(HarvestError)` - Crawl failed with a fatal error
///
/// # Example
///
/// ```no_run
/// use wp_harvest::config::load_config_with_hash;
/// use wp_harvest::crawler::{run_crawl, CrawlOptions};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let report = run_crawl(config, &hash, CrawlOptions::default()).await?;
/// println!("{} articles scraped", report.statistics.total_articles);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    config_hash: &str,
    options: CrawlOptions,
) -> Result<CrawlReport, HarvestError> {
    let coordinator = Coordinator::new(config, config_hash)?;

    let stop = coordinator.stop_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight articles (Ctrl-C again to abort)");
            stop.stop();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Second interrupt, exiting immediately");
            std::process::exit(130);
        }
    });

    let report = coordinator.run(&options).await;
    interrupt.abort();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlerConfig, OutputConfig, SiteConfig};
    use crate::crawler::fetcher::{FetchError, HttpResponse};
    use crate::crawler::ArticleFields;
    use crate::output::OutputResult;
    use crate::storage::ArticleRecord;
    use crate::thread::CommentNode;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    const BASE: &str = "https://example.com";

    /// One archive month with a single article and no further listing pages
    struct TinySite;

    #[async_trait]
    impl HttpTransport for TinySite {
        async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
            let body = match url {
                "https://example.com/2017/01/" => {
                    r#"<article><h2 class="entry-title">
                         <a href="https://example.com/2017/01/20/inauguration/">Inauguration</a>
                       </h2></article>"#
                }
                "https://example.com/2017/01/20/inauguration/" => {
                    r#"<article><h1 class="entry-title">Inauguration</h1>
                         <div class="entry-content"><p>Body</p></div></article>
                       <ol><li id="comment-1" class="comment">
                         <div class="comment-content"><p>hello</p></div></li></ol>"#
                }
                _ => return Err(FetchError::Http(404)),
            };
            Ok(HttpResponse {
                status: 200,
                final_url: url.to_string(),
                body: body.to_string(),
            })
        }
    }

    struct NullWriter;

    impl ArticleWriter for NullWriter {
        fn write_article(
            &self,
            _article: &ArticleRecord,
            _fields: &ArticleFields,
            _comments: &[CommentNode],
        ) -> OutputResult<()> {
            Ok(())
        }
    }

    fn config(dir: &Path) -> Config {
        Config {
            crawler: CrawlerConfig {
                start_date: NaiveDate::from_ymd_opt(2017, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2017, 1, 31),
                request_delay_seconds: 0.001,
                max_retries: 0,
                timeout_seconds: 5,
                max_comment_depth: 32,
                worker_count: 1,
                backoff_cap_seconds: 0.01,
                claim_batch_size: 10,
                max_archive_pages: 5,
            },
            site: SiteConfig {
                base_url: BASE.to_string(),
                user_agent: "test".to_string(),
            },
            output: OutputConfig {
                database_path: dir.join("progress.db").display().to_string(),
                corpus_dir: dir.join("corpus").display().to_string(),
            },
        }
    }

    fn coordinator(dir: &Path) -> Coordinator {
        Coordinator::with_components(config(dir), "hash", Arc::new(TinySite), Arc::new(NullWriter))
            .unwrap()
    }

    #[test]
    fn test_crawl_mode_phases() {
        assert!(CrawlMode::Full.discovers() && CrawlMode::Full.scrapes());
        assert!(!CrawlMode::DiscoverOnly.scrapes());
        assert!(!CrawlMode::ScrapeOnly.discovers());
    }

    #[tokio::test]
    async fn test_full_run_completes() {
        let dir = tempfile::tempdir().unwrap();
        let report = coordinator(dir.path())
            .run(&CrawlOptions::default())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.discovery.as_ref().unwrap().new_articles, 1);
        assert_eq!(report.schedule.as_ref().unwrap().scraped, 1);
        assert_eq!(report.statistics.count(ArticleStatus::Scraped), 1);
        assert_eq!(report.statistics.comments_emitted, 1);
    }

    #[tokio::test]
    async fn test_discover_only_leaves_articles_pending() {
        let dir = tempfile::tempdir().unwrap();
        let options = CrawlOptions {
            mode: CrawlMode::DiscoverOnly,
            ..Default::default()
        };
        let report = coordinator(dir.path()).run(&options).await.unwrap();

        assert!(report.schedule.is_none());
        assert_eq!(report.statistics.count(ArticleStatus::Pending), 1);
    }

    #[tokio::test]
    async fn test_stopped_run_is_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        coordinator.stop_handle().stop();

        let report = coordinator.run(&CrawlOptions::default()).await.unwrap();

        assert_eq!(report.status, RunStatus::Interrupted);
        assert!(report.discovery.unwrap().stopped);
        assert!(report.schedule.is_none());
    }

    #[tokio::test]
    async fn test_stale_running_run_is_marked_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        let stale = lock_storage(&coordinator.storage())
            .unwrap()
            .create_run("hash")
            .unwrap();

        let report = coordinator.run(&CrawlOptions::default()).await.unwrap();

        assert!(report.run_id > stale);
        let storage = coordinator.storage();
        let storage = lock_storage(&storage).unwrap();
        let latest = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(latest.id, report.run_id);
        assert_eq!(latest.status, RunStatus::Completed);
    }
}
