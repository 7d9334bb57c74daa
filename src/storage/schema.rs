//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the wp-harvest
//! progress database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per discovered article; rows are never deleted
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    published_on TEXT,
    title TEXT,
    comment_count_hint INTEGER,
    comments_emitted INTEGER NOT NULL DEFAULT 0,
    partial INTEGER NOT NULL DEFAULT 0,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_attempt_at TEXT,
    last_error TEXT,
    error_class TEXT,
    discovered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(status);
CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published_on, id);

-- Outcome of each fetched comment page, with the raw records it yielded
CREATE TABLE IF NOT EXISTS comment_pages (
    article_id TEXT NOT NULL REFERENCES articles(article_id),
    page_number INTEGER NOT NULL,
    status TEXT NOT NULL,
    record_count INTEGER NOT NULL DEFAULT 0,
    records_json TEXT NOT NULL DEFAULT '[]',
    fetched_at TEXT NOT NULL,
    PRIMARY KEY (article_id, page_number)
);

-- Global comment id dedup index
CREATE TABLE IF NOT EXISTS seen_comments (
    comment_id TEXT PRIMARY KEY,
    article_id TEXT NOT NULL,
    first_seen_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_seen_comments_article ON seen_comments(article_id);

-- Archive months whose listing pages were fully walked
CREATE TABLE IF NOT EXISTS archive_months (
    month TEXT PRIMARY KEY,
    article_count INTEGER NOT NULL,
    completed_at TEXT NOT NULL
);

-- Data quality warnings raised during reconstruction
CREATE TABLE IF NOT EXISTS data_quality_warnings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id TEXT,
    kind TEXT NOT NULL,
    detail TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_warnings_kind ON data_quality_warnings(kind);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
