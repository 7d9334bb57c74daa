//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `ArticleStatus`: Lifecycle of a discovered article (pending, scraped, failed, unavailable)
//! - `PageFetchStatus`: Outcome of fetching one comment page of an article
//! - `RetryState`: Per-request retry bookkeeping used by the fetcher

mod article_state;
mod retry_state;

// Re-export main types
pub use article_state::{ArticleStatus, PageFetchStatus};
pub use retry_state::RetryState;
