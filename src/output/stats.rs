//! Statistics generation from the progress store
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics, including the data quality warnings accumulated
//! across runs.

use crate::state::{ArticleStatus, PageFetchStatus};
use crate::storage::{Storage, WarningRecord};
use crate::HarvestError;
use std::collections::HashMap;

/// Number of recent warnings included in a statistics report
const RECENT_WARNINGS: u32 = 20;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of articles discovered
    pub total_articles: u64,

    /// Count of articles by status
    pub articles_by_status: HashMap<ArticleStatus, u64>,

    /// Articles scraped with incomplete comment data
    pub partial_articles: u64,

    pub comment_pages_done: u64,
    pub comment_pages_failed: u64,

    /// Comments written to the corpus
    pub comments_emitted: u64,

    /// Distinct comment ids in the dedup index
    pub comment_ids_seen: u64,

    /// Archive months fully walked by discovery
    pub months_completed: u64,

    /// Data quality warnings by kind, most frequent first
    pub warnings_by_kind: Vec<(String, u64)>,

    pub recent_warnings: Vec<WarningRecord>,
}

impl CrawlStatistics {
    /// Returns the article count for a status
    pub fn count(&self, status: ArticleStatus) -> u64 {
        self.articles_by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn total_warnings(&self) -> u64 {
        self.warnings_by_kind.iter().map(|(_, n)| n).sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, HarvestError> {
    let mut articles_by_status = HashMap::new();
    for status in ArticleStatus::all_states() {
        articles_by_status.insert(status, storage.count_articles_by_status(status)?);
    }

    let mut warnings_by_kind = storage.count_warnings_by_kind()?;
    warnings_by_kind.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    Ok(CrawlStatistics {
        total_articles: storage.count_total_articles()?,
        articles_by_status,
        partial_articles: storage.count_partial_articles()?,
        comment_pages_done: storage.count_comment_pages(PageFetchStatus::Done)?,
        comment_pages_failed: storage.count_comment_pages(PageFetchStatus::Failed)?,
        comments_emitted: storage.count_comments_emitted()?,
        comment_ids_seen: storage.count_seen_comments()?,
        months_completed: storage.count_completed_months()?,
        warnings_by_kind,
        recent_warnings: storage.list_warnings(RECENT_WARNINGS)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Articles:");
    println!("  Total discovered: {}", stats.total_articles);
    for status in ArticleStatus::all_states() {
        let count = stats.count(status);
        let percentage = if stats.total_articles > 0 {
            (count as f64 / stats.total_articles as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!("  Scraped with partial comments: {}", stats.partial_articles);
    println!();

    println!("Comments:");
    println!("  Pages fetched: {}", stats.comment_pages_done);
    println!("  Pages failed: {}", stats.comment_pages_failed);
    println!("  Comments written: {}", stats.comments_emitted);
    println!("  Distinct comment ids seen: {}", stats.comment_ids_seen);
    println!();

    println!("Discovery:");
    println!("  Archive months completed: {}", stats.months_completed);
    println!();

    if stats.warnings_by_kind.is_empty() {
        println!("Data Quality Warnings: none");
        return;
    }

    println!("Data Quality Warnings ({}):", stats.total_warnings());
    for (kind, count) in &stats.warnings_by_kind {
        println!("  {}: {}", kind, count);
    }

    if !stats.recent_warnings.is_empty() {
        println!();
        println!("Most recent:");
        for warning in &stats.recent_warnings {
            println!(
                "  [{}] {} {}: {}",
                warning.recorded_at,
                warning.article_id.as_deref().unwrap_or("-"),
                warning.kind,
                warning.detail
            );
        }
    }
}
