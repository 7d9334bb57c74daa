use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for wp-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub site: SiteConfig,
    pub output: OutputConfig,
}

/// Crawl window, politeness and retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// First day of the discovery window (inclusive)
    #[serde(rename = "start-date")]
    pub start_date: NaiveDate,

    /// Last day of the discovery window (inclusive); defaults to today
    #[serde(rename = "end-date", default)]
    pub end_date: Option<NaiveDate>,

    /// Minimum delay between requests, process-wide (seconds)
    #[serde(rename = "request-delay-seconds", default = "default_request_delay")]
    pub request_delay_seconds: f64,

    /// Retries for transient failures (timeouts, 429, 5xx)
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-seconds", default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Replies nested deeper than this are collapsed to this depth
    #[serde(rename = "max-comment-depth", default = "default_max_comment_depth")]
    pub max_comment_depth: u32,

    /// Number of articles processed concurrently
    #[serde(rename = "worker-count", default = "default_worker_count")]
    pub worker_count: u32,

    /// Upper bound on a single backoff sleep (seconds)
    #[serde(rename = "backoff-cap-seconds", default = "default_backoff_cap")]
    pub backoff_cap_seconds: f64,

    /// How many pending articles are claimed from the store at once
    #[serde(rename = "claim-batch-size", default = "default_claim_batch_size")]
    pub claim_batch_size: u32,

    /// Safety limit on listing pages walked per archive month
    #[serde(rename = "max-archive-pages", default = "default_max_archive_pages")]
    pub max_archive_pages: u32,
}

impl CrawlerConfig {
    /// Returns the configured end date, or today when none was given
    pub fn effective_end_date(&self) -> NaiveDate {
        self.end_date.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_secs_f64(self.backoff_cap_seconds)
    }
}

/// Target site configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site root, e.g. "https://wattsupwiththat.com"
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite progress database
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory receiving one text file per scraped article
    #[serde(rename = "corpus-dir")]
    pub corpus_dir: String,
}

fn default_request_delay() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    5
}

fn default_timeout() -> u64 {
    30
}

fn default_max_comment_depth() -> u32 {
    32
}

fn default_worker_count() -> u32 {
    1
}

fn default_backoff_cap() -> f64 {
    60.0
}

fn default_claim_batch_size() -> u32 {
    50
}

fn default_max_archive_pages() -> u32 {
    50
}

fn default_user_agent() -> String {
    format!("wp-harvest/{}", env!("CARGO_PKG_VERSION"))
}
