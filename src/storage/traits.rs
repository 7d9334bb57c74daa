//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{ArticleStatus, PageFetchStatus};
use crate::storage::{
    ArticleFailure, ArticleRecord, CommentPageRecord, RunRecord, RunStatus, WarningRecord,
};
use crate::thread::RawCommentRecord;
use chrono::NaiveDate;
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Article not found: {0}")]
    ArticleNotFound(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ArticleStatus,
        to: ArticleStatus,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for progress store implementations
///
/// Every write is a single statement or a single transaction keyed by
/// article id or (article id, page number), so a crash between calls never
/// leaves a half-applied update behind.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run finished with the given status
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Article Management =====

    /// Registers a discovered article, or returns the existing record
    ///
    /// The caller passes an already canonicalized URL. Registering a URL that
    /// is already known never changes its status.
    ///
    /// # Arguments
    ///
    /// * `url` - Canonical article URL
    /// * `published_on` - Publication date, when the URL carries one
    ///
    /// # Returns
    ///
    /// The article record and `true` if it was newly inserted
    fn register_article(
        &mut self,
        url: &str,
        published_on: Option<NaiveDate>,
    ) -> StorageResult<(ArticleRecord, bool)>;

    /// Gets an article by row ID
    fn get_article(&self, id: i64) -> StorageResult<ArticleRecord>;

    /// Gets an article by canonical URL
    fn get_article_by_url(&self, url: &str) -> StorageResult<Option<ArticleRecord>>;

    /// Returns up to `limit` pending articles, oldest publication first
    fn claim_pending_articles(&self, limit: u32) -> StorageResult<Vec<ArticleRecord>>;

    /// Applies a status transition to an article
    ///
    /// Re-applying the status an article already has is a no-op, so a
    /// replayed write after a crash is harmless. Any other illegal
    /// transition is rejected with `StorageError::InvalidTransition`.
    fn mark_article_result(
        &mut self,
        id: i64,
        status: ArticleStatus,
        failure: Option<&ArticleFailure>,
    ) -> StorageResult<()>;

    /// Moves failed articles below the retry budget back to pending
    fn reset_failed_articles(&mut self, max_retry_count: u32) -> StorageResult<usize>;

    /// Stores the title and reported comment count of an article
    fn set_article_metadata(
        &mut self,
        id: i64,
        title: Option<&str>,
        comment_count_hint: Option<u32>,
    ) -> StorageResult<()>;

    /// Records how many comments were written and whether data was partial
    fn mark_comments_emitted(&mut self, id: i64, count: u32, partial: bool) -> StorageResult<()>;

    // ===== Comment Pages =====

    /// Records the outcome of a comment page fetch
    ///
    /// A page already recorded `done` is never overwritten.
    fn record_comment_page(
        &mut self,
        article_id: &str,
        page_number: u32,
        status: PageFetchStatus,
        records: &[RawCommentRecord],
    ) -> StorageResult<()>;

    /// Returns the pages already recorded `done`, ordered by page number
    fn completed_comment_pages(&self, article_id: &str) -> StorageResult<Vec<CommentPageRecord>>;

    // ===== Comment Dedup Index =====

    /// Checks whether a comment id has been seen by any article
    fn is_comment_id_seen(&self, comment_id: &str) -> StorageResult<bool>;

    /// Marks a comment id as seen; returns true if it was newly marked
    fn mark_comment_id_seen(&mut self, comment_id: &str, article_id: &str) -> StorageResult<bool>;

    /// Claims a set of comment ids for an article in one transaction
    ///
    /// # Returns
    ///
    /// The ids this article owns: those newly marked plus those previously
    /// marked by the same article. Ids owned by another article are left out.
    fn claim_comment_ids(
        &mut self,
        article_id: &str,
        comment_ids: &[String],
    ) -> StorageResult<HashSet<String>>;

    // ===== Archive Months =====

    /// Checks whether every listing page of a month (`YYYY-MM`) was walked
    fn is_archive_month_complete(&self, month: &str) -> StorageResult<bool>;

    /// Records a month as fully walked
    fn mark_archive_month_complete(&mut self, month: &str, article_count: u32)
        -> StorageResult<()>;

    // ===== Data Quality =====

    /// Persists a data quality warning
    fn record_warning(
        &mut self,
        article_id: Option<&str>,
        kind: &str,
        detail: &str,
    ) -> StorageResult<()>;

    /// Lists the most recent warnings, newest first
    fn list_warnings(&self, limit: u32) -> StorageResult<Vec<WarningRecord>>;

    /// Gets warning counts grouped by kind
    fn count_warnings_by_kind(&self) -> StorageResult<Vec<(String, u64)>>;

    // ===== Statistics =====

    /// Counts articles in a status
    fn count_articles_by_status(&self, status: ArticleStatus) -> StorageResult<u64>;

    /// Gets total article count
    fn count_total_articles(&self) -> StorageResult<u64>;

    /// Counts comment pages in a status
    fn count_comment_pages(&self, status: PageFetchStatus) -> StorageResult<u64>;

    /// Counts entries in the dedup index
    fn count_seen_comments(&self) -> StorageResult<u64>;

    /// Sums the comments written across all articles
    fn count_comments_emitted(&self) -> StorageResult<u64>;

    /// Counts articles scraped with incomplete comment data
    fn count_partial_articles(&self) -> StorageResult<u64>;

    /// Counts archive months recorded complete
    fn count_completed_months(&self) -> StorageResult<u64>;
}
