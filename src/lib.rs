//! wp-harvest: a resumable WordPress article and comment-thread harvester
//!
//! This crate discovers articles from monthly archive pages, fetches each
//! article together with every page of its comment thread, and rebuilds the
//! flat, paginated comment stream into a nested, deduplicated thread. All
//! crawl progress lives in a SQLite progress store so an interrupted run can
//! be resumed without duplicate work.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod thread;
pub mod url;

use thiserror::Error;

/// Main error type for wp-harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Extraction error: {0}")]
    Extract(#[from] crawler::ExtractError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: state::ArticleStatus,
        to: state::ArticleStatus,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Classifies this error according to the crawl error taxonomy
    ///
    /// Only `PermanentSkip` and `Fatal` errors ever reach the scheduler;
    /// transient failures are absorbed by the fetcher's retry loop and data
    /// quality problems are logged where they are detected.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Fetch(e) => e.class(),
            Self::Extract(_) | Self::Url(_) | Self::InvalidTransition { .. } => {
                ErrorClass::PermanentSkip
            }
            Self::Output(_) => ErrorClass::PermanentSkip,
            Self::Reqwest(e) if e.is_timeout() => ErrorClass::Transient,
            Self::Reqwest(_) => ErrorClass::PermanentSkip,
            Self::Config(_) | Self::Database(_) | Self::Storage(_) | Self::Io(_) => {
                ErrorClass::Fatal
            }
        }
    }

    /// Returns true if the crawl cannot safely continue after this error
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

/// Error taxonomy used to decide how a failure propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Timeout, 5xx, 429: retried with backoff
    Transient,
    /// 404, unparseable HTML: recorded, never retried automatically
    PermanentSkip,
    /// Orphans, count mismatches, depth overflow: logged, processing continues
    DataQuality,
    /// Progress store unreachable: aborts the run
    Fatal,
}

impl ErrorClass {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::PermanentSkip => "permanent_skip",
            Self::DataQuality => "data_quality",
            Self::Fatal => "fatal",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "transient" => Some(Self::Transient),
            "permanent_skip" => Some(Self::PermanentSkip),
            "data_quality" => Some(Self::DataQuality),
            "fatal" => Some(Self::Fatal),
            _ => None,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid date in config: {0}")]
    InvalidDate(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Not an article URL: {0}")]
    NotAnArticle(String),
}

/// Result type alias for wp-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{ArticleStatus, PageFetchStatus};
pub use thread::{reconstruct, CommentNode, RawCommentRecord};
pub use url::{article_id_for, canonicalize_article_url};
