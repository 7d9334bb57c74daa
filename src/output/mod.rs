//! Output module for the article corpus and crawl reports
//!
//! This module handles:
//! - The writer interface invoked once per scraped article
//! - Plain-text corpus files with threaded comments
//! - Statistics read back from the progress store

pub mod stats;
mod text;
mod traits;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use text::{render_article, PlainTextWriter};
pub use traits::{ArticleWriter, OutputError, OutputResult};
