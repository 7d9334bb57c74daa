//! Storage module for persisting crawl progress
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Article state persistence and transitions
//! - Per-page comment fetch outcomes (with raw records for resume)
//! - The global comment id dedup index
//! - Run tracking, completed archive months and data quality warnings

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{ArticleStatus, PageFetchStatus};
use crate::thread::RawCommentRecord;
use crate::{ErrorClass, HarvestError};
use chrono::NaiveDate;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(HarvestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// Store shared between the discovery driver and scheduler workers
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Locks the shared store, mapping mutex poisoning into a storage error
pub fn lock_storage(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage
        .lock()
        .map_err(|e| StorageError::Database(format!("storage mutex poisoned: {}", e)))
}

/// Represents an article in the database
#[derive(Debug, Clone)]
pub struct ArticleRecord {
    pub id: i64,
    pub article_id: String,
    pub url: String,
    pub status: ArticleStatus,
    pub published_on: Option<NaiveDate>,
    pub title: Option<String>,
    pub comment_count_hint: Option<u32>,
    pub comments_emitted: u32,
    pub partial: bool,
    pub retry_count: u32,
    pub last_attempt_at: Option<String>,
    pub last_error: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub discovered_at: String,
}

/// Failure details recorded alongside a `failed` transition
#[derive(Debug, Clone)]
pub struct ArticleFailure {
    pub class: ErrorClass,
    pub message: String,
}

impl ArticleFailure {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

/// Outcome of fetching one comment page of an article
#[derive(Debug, Clone)]
pub struct CommentPageRecord {
    pub article_id: String,
    pub page_number: u32,
    pub status: PageFetchStatus,
    pub record_count: u32,
    pub fetched_at: String,
    pub records: Vec<RawCommentRecord>,
}

/// A persisted data quality warning
#[derive(Debug, Clone)]
pub struct WarningRecord {
    pub id: i64,
    pub article_id: Option<String>,
    pub kind: String,
    pub detail: String,
    pub recorded_at: String,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
