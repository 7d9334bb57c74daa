//! Crawler module for discovering and scraping articles
//!
//! This module contains the core crawling logic, including:
//! - Rate-limited HTTP fetching with retry and backoff
//! - HTML extraction of listing links, article fields and comments
//! - Archive discovery feeding the progress store
//! - Per-article processing and the worker pool scheduling it
//! - Overall crawl coordination

mod article;
mod coordinator;
mod discovery;
mod extract;
mod fetcher;
mod scheduler;

pub use article::{ArticleOutcome, ArticlePhase, ArticleProcessor};
pub use coordinator::{run_crawl, Coordinator, CrawlMode, CrawlOptions, CrawlReport, StopHandle};
pub use discovery::{months_in_range, DiscoveryDriver, DiscoveryReport};
pub use extract::{ArticleFields, ArticleLink, ExtractError, HtmlExtractor, WordPressExtractor};
pub use fetcher::{
    FetchError, FetchedPage, HttpResponse, HttpTransport, PolitenessGate, RateLimitedFetcher,
    ReqwestTransport, RetryPolicy,
};
pub use scheduler::{ScheduleReport, Scheduler};
