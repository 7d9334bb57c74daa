//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{ArticleStatus, PageFetchStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    ArticleFailure, ArticleRecord, CommentPageRecord, RunRecord, RunStatus, WarningRecord,
};
use crate::thread::RawCommentRecord;
use crate::url::article_id_for;
use crate::{ErrorClass, HarvestError};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

const ARTICLE_COLUMNS: &str = "id, article_id, url, status, published_on, title, \
     comment_count_hint, comments_emitted, partial, retry_count, last_attempt_at, \
     last_error, error_class, discovered_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn query_article(&self, clause: &str, key: &dyn rusqlite::ToSql) -> StorageResult<Option<ArticleRecord>> {
        let sql = format!("SELECT {} FROM articles WHERE {}", ARTICLE_COLUMNS, clause);
        let article = self
            .conn
            .query_row(&sql, [key], article_from_row)
            .optional()?;
        Ok(article)
    }

    fn count(&self, sql: &str, param: Option<&str>) -> StorageResult<u64> {
        let count: i64 = match param {
            Some(p) => self.conn.query_row(sql, params![p], |row| row.get(0))?,
            None => self.conn.query_row(sql, [], |row| row.get(0))?,
        };
        Ok(count.max(0) as u64)
    }
}

fn article_from_row(row: &Row<'_>) -> rusqlite::Result<ArticleRecord> {
    let published_on: Option<String> = row.get(4)?;
    let error_class: Option<String> = row.get(12)?;
    Ok(ArticleRecord {
        id: row.get(0)?,
        article_id: row.get(1)?,
        url: row.get(2)?,
        status: ArticleStatus::from_db_string(&row.get::<_, String>(3)?)
            .unwrap_or(ArticleStatus::Failed),
        published_on: published_on.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        title: row.get(5)?,
        comment_count_hint: row.get(6)?,
        comments_emitted: row.get(7)?,
        partial: row.get::<_, i64>(8)? != 0,
        retry_count: row.get(9)?,
        last_attempt_at: row.get(10)?,
        last_error: row.get(11)?,
        error_class: error_class.and_then(|s| ErrorClass::from_db_string(&s)),
        discovered_at: row.get(13)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    // ===== Article Management =====

    fn register_article(
        &mut self,
        url: &str,
        published_on: Option<NaiveDate>,
    ) -> StorageResult<(ArticleRecord, bool)> {
        let article_id = article_id_for(url);
        let now = Utc::now().to_rfc3339();

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO articles (article_id, url, status, published_on, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                article_id,
                url,
                ArticleStatus::Pending.to_db_string(),
                published_on.map(|d| d.format("%Y-%m-%d").to_string()),
                now
            ],
        )?;

        let record = match self.get_article_by_url(url)? {
            Some(record) => record,
            // Different URL with a colliding derived id
            None => self
                .query_article("article_id = ?1", &article_id)?
                .ok_or_else(|| StorageError::ArticleNotFound(url.to_string()))?,
        };

        Ok((record, inserted > 0))
    }

    fn get_article(&self, id: i64) -> StorageResult<ArticleRecord> {
        self.query_article("id = ?1", &id)?
            .ok_or_else(|| StorageError::ArticleNotFound(format!("Article ID {}", id)))
    }

    fn get_article_by_url(&self, url: &str) -> StorageResult<Option<ArticleRecord>> {
        self.query_article("url = ?1", &url)
    }

    fn claim_pending_articles(&self, limit: u32) -> StorageResult<Vec<ArticleRecord>> {
        let sql = format!(
            "SELECT {} FROM articles WHERE status = ?1
             ORDER BY published_on IS NULL, published_on ASC, id ASC LIMIT ?2",
            ARTICLE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let articles = stmt
            .query_map(
                params![ArticleStatus::Pending.to_db_string(), limit],
                article_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(articles)
    }

    fn mark_article_result(
        &mut self,
        id: i64,
        status: ArticleStatus,
        failure: Option<&ArticleFailure>,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM articles WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let current = current
            .and_then(|s| ArticleStatus::from_db_string(&s))
            .ok_or_else(|| StorageError::ArticleNotFound(format!("Article ID {}", id)))?;

        if current == status {
            tracing::debug!("Article {} already {}, ignoring replayed transition", id, status);
            return Ok(());
        }

        if !current.can_transition_to(status) {
            return Err(StorageError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        let now = Utc::now().to_rfc3339();
        match status {
            ArticleStatus::Failed => {
                let (class, message) = match failure {
                    Some(f) => (Some(f.class.to_db_string()), Some(f.message.as_str())),
                    None => (None, None),
                };
                tx.execute(
                    "UPDATE articles SET status = ?1, last_attempt_at = ?2, last_error = ?3,
                     error_class = ?4, retry_count = retry_count + 1 WHERE id = ?5",
                    params![status.to_db_string(), now, message, class, id],
                )?;
            }
            ArticleStatus::Pending => {
                tx.execute(
                    "UPDATE articles SET status = ?1 WHERE id = ?2",
                    params![status.to_db_string(), id],
                )?;
            }
            ArticleStatus::Scraped | ArticleStatus::Unavailable => {
                let (class, message) = match failure {
                    Some(f) => (Some(f.class.to_db_string()), Some(f.message.as_str())),
                    None => (None, None),
                };
                tx.execute(
                    "UPDATE articles SET status = ?1, last_attempt_at = ?2, last_error = ?3,
                     error_class = ?4 WHERE id = ?5",
                    params![status.to_db_string(), now, message, class, id],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn reset_failed_articles(&mut self, max_retry_count: u32) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "UPDATE articles SET status = ?1 WHERE status = ?2 AND retry_count < ?3",
            params![
                ArticleStatus::Pending.to_db_string(),
                ArticleStatus::Failed.to_db_string(),
                max_retry_count
            ],
        )?;
        Ok(changed)
    }

    fn set_article_metadata(
        &mut self,
        id: i64,
        title: Option<&str>,
        comment_count_hint: Option<u32>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE articles SET title = COALESCE(?1, title),
             comment_count_hint = COALESCE(?2, comment_count_hint) WHERE id = ?3",
            params![title, comment_count_hint, id],
        )?;
        Ok(())
    }

    fn mark_comments_emitted(&mut self, id: i64, count: u32, partial: bool) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE articles SET comments_emitted = ?1, partial = ?2 WHERE id = ?3",
            params![count, partial as i64, id],
        )?;
        Ok(())
    }

    // ===== Comment Pages =====

    fn record_comment_page(
        &mut self,
        article_id: &str,
        page_number: u32,
        status: PageFetchStatus,
        records: &[RawCommentRecord],
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        let existing: Option<(String, u32)> = tx
            .query_row(
                "SELECT status, record_count FROM comment_pages
                 WHERE article_id = ?1 AND page_number = ?2",
                params![article_id, page_number],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((existing_status, existing_count)) = existing {
            if PageFetchStatus::from_db_string(&existing_status) == Some(PageFetchStatus::Done) {
                if status == PageFetchStatus::Done && existing_count as usize != records.len() {
                    tracing::warn!(
                        "Comment page {} of {} re-recorded with {} records (previously {}), keeping the original",
                        page_number,
                        article_id,
                        records.len(),
                        existing_count
                    );
                }
                return Ok(());
            }
        }

        let json = match status {
            PageFetchStatus::Done => serde_json::to_string(records)?,
            PageFetchStatus::Failed => "[]".to_string(),
        };
        let count = match status {
            PageFetchStatus::Done => records.len() as u32,
            PageFetchStatus::Failed => 0,
        };
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO comment_pages (article_id, page_number, status, record_count, records_json, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(article_id, page_number) DO UPDATE SET
                status = excluded.status,
                record_count = excluded.record_count,
                records_json = excluded.records_json,
                fetched_at = excluded.fetched_at",
            params![article_id, page_number, status.to_db_string(), count, json, now],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn completed_comment_pages(&self, article_id: &str) -> StorageResult<Vec<CommentPageRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT article_id, page_number, status, record_count, fetched_at, records_json
             FROM comment_pages WHERE article_id = ?1 AND status = ?2 ORDER BY page_number",
        )?;

        let rows = stmt
            .query_map(
                params![article_id, PageFetchStatus::Done.to_db_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut pages = Vec::with_capacity(rows.len());
        for (article_id, page_number, record_count, fetched_at, json) in rows {
            let records: Vec<RawCommentRecord> = serde_json::from_str(&json)?;
            pages.push(CommentPageRecord {
                article_id,
                page_number,
                status: PageFetchStatus::Done,
                record_count,
                fetched_at,
                records,
            });
        }

        Ok(pages)
    }

    // ===== Comment Dedup Index =====

    fn is_comment_id_seen(&self, comment_id: &str) -> StorageResult<bool> {
        let seen: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM seen_comments WHERE comment_id = ?1",
                params![comment_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seen.is_some())
    }

    fn mark_comment_id_seen(&mut self, comment_id: &str, article_id: &str) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO seen_comments (comment_id, article_id, first_seen_at)
             VALUES (?1, ?2, ?3)",
            params![comment_id, article_id, now],
        )?;
        Ok(inserted > 0)
    }

    fn claim_comment_ids(
        &mut self,
        article_id: &str,
        comment_ids: &[String],
    ) -> StorageResult<HashSet<String>> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut owned = HashSet::with_capacity(comment_ids.len());

        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO seen_comments (comment_id, article_id, first_seen_at)
                 VALUES (?1, ?2, ?3)",
            )?;
            let mut owner = tx.prepare("SELECT article_id FROM seen_comments WHERE comment_id = ?1")?;

            for comment_id in comment_ids {
                if insert.execute(params![comment_id, article_id, now])? > 0 {
                    owned.insert(comment_id.clone());
                    continue;
                }
                let existing: String = owner.query_row(params![comment_id], |row| row.get(0))?;
                if existing == article_id {
                    owned.insert(comment_id.clone());
                }
            }
        }

        tx.commit()?;
        Ok(owned)
    }

    // ===== Archive Months =====

    fn is_archive_month_complete(&self, month: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM archive_months WHERE month = ?1",
                params![month],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark_archive_month_complete(
        &mut self,
        month: &str,
        article_count: u32,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO archive_months (month, article_count, completed_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(month) DO UPDATE SET article_count = excluded.article_count,
                completed_at = excluded.completed_at",
            params![month, article_count, now],
        )?;
        Ok(())
    }

    // ===== Data Quality =====

    fn record_warning(
        &mut self,
        article_id: Option<&str>,
        kind: &str,
        detail: &str,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO data_quality_warnings (article_id, kind, detail, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![article_id, kind, detail, now],
        )?;
        Ok(())
    }

    fn list_warnings(&self, limit: u32) -> StorageResult<Vec<WarningRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, article_id, kind, detail, recorded_at FROM data_quality_warnings
             ORDER BY id DESC LIMIT ?1",
        )?;
        let warnings = stmt
            .query_map(params![limit], |row| {
                Ok(WarningRecord {
                    id: row.get(0)?,
                    article_id: row.get(1)?,
                    kind: row.get(2)?,
                    detail: row.get(3)?,
                    recorded_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(warnings)
    }

    fn count_warnings_by_kind(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, COUNT(*) FROM data_quality_warnings GROUP BY kind ORDER BY kind",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (kind, count) = row?;
            counts.push((kind, count.max(0) as u64));
        }
        Ok(counts)
    }

    // ===== Statistics =====

    fn count_articles_by_status(&self, status: ArticleStatus) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM articles WHERE status = ?1",
            Some(status.to_db_string()),
        )
    }

    fn count_total_articles(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM articles", None)
    }

    fn count_comment_pages(&self, status: PageFetchStatus) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM comment_pages WHERE status = ?1",
            Some(status.to_db_string()),
        )
    }

    fn count_seen_comments(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM seen_comments", None)
    }

    fn count_comments_emitted(&self) -> StorageResult<u64> {
        self.count("SELECT COALESCE(SUM(comments_emitted), 0) FROM articles", None)
    }

    fn count_partial_articles(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM articles WHERE partial = 1", None)
    }

    fn count_completed_months(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM archive_months", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL_A: &str = "https://wattsupwiththat.com/2017/01/20/inauguration-day/";
    const URL_B: &str = "https://wattsupwiththat.com/2017/01/21/the-day-after/";

    fn record(id: &str, page: u32, position: u32) -> RawCommentRecord {
        RawCommentRecord {
            comment_id: id.to_string(),
            parent_id: None,
            author: "reader".to_string(),
            author_url: None,
            timestamp: "2017-01-20T10:00:00".to_string(),
            text: format!("comment {}", id),
            upvotes: 0,
            downvotes: 0,
            page_number: page,
            position,
            image_urls: vec![],
        }
    }

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteStorage::new_in_memory().is_ok());
    }

    #[test]
    fn test_create_and_finish_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("test_hash").unwrap();
        assert!(run_id > 0);

        storage.finish_run(run_id, RunStatus::Interrupted).unwrap();
        let latest = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(latest.id, run_id);
        assert_eq!(latest.status, RunStatus::Interrupted);
        assert!(latest.finished_at.is_some());
    }

    #[test]
    fn test_register_article_is_idempotent() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let (first, is_new) = storage.register_article(URL_A, date(2017, 1, 20)).unwrap();
        assert!(is_new);
        assert_eq!(first.status, ArticleStatus::Pending);
        assert_eq!(first.article_id, "20170120_inauguration-day");

        storage
            .mark_article_result(first.id, ArticleStatus::Scraped, None)
            .unwrap();

        let (second, is_new) = storage.register_article(URL_A, date(2017, 1, 20)).unwrap();
        assert!(!is_new);
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, ArticleStatus::Scraped);
        assert_eq!(storage.count_total_articles().unwrap(), 1);
    }

    #[test]
    fn test_claim_orders_by_publication_date() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.register_article(URL_B, date(2017, 1, 21)).unwrap();
        storage.register_article(URL_A, date(2017, 1, 20)).unwrap();

        let claimed = storage.claim_pending_articles(10).unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].url, URL_A);
        assert_eq!(claimed[1].url, URL_B);

        let limited = storage.claim_pending_articles(1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (article, _) = storage.register_article(URL_A, None).unwrap();

        storage
            .mark_article_result(article.id, ArticleStatus::Scraped, None)
            .unwrap();
        let result = storage.mark_article_result(article.id, ArticleStatus::Failed, None);

        assert!(matches!(
            result,
            Err(StorageError::InvalidTransition {
                from: ArticleStatus::Scraped,
                to: ArticleStatus::Failed
            })
        ));
    }

    #[test]
    fn test_replayed_transition_is_noop() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (article, _) = storage.register_article(URL_A, None).unwrap();
        let failure = ArticleFailure::new(ErrorClass::PermanentSkip, "unparseable");

        storage
            .mark_article_result(article.id, ArticleStatus::Failed, Some(&failure))
            .unwrap();
        storage
            .mark_article_result(article.id, ArticleStatus::Failed, Some(&failure))
            .unwrap();

        let reloaded = storage.get_article(article.id).unwrap();
        assert_eq!(reloaded.status, ArticleStatus::Failed);
        assert_eq!(reloaded.retry_count, 1);
        assert_eq!(reloaded.error_class, Some(ErrorClass::PermanentSkip));
        assert_eq!(reloaded.last_error.as_deref(), Some("unparseable"));
    }

    #[test]
    fn test_reset_failed_respects_budget() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (a, _) = storage.register_article(URL_A, None).unwrap();
        let (b, _) = storage.register_article(URL_B, None).unwrap();
        let failure = ArticleFailure::new(ErrorClass::Transient, "HTTP 503");

        storage
            .mark_article_result(a.id, ArticleStatus::Failed, Some(&failure))
            .unwrap();
        // b fails twice
        storage
            .mark_article_result(b.id, ArticleStatus::Failed, Some(&failure))
            .unwrap();
        storage
            .mark_article_result(b.id, ArticleStatus::Pending, None)
            .unwrap();
        storage
            .mark_article_result(b.id, ArticleStatus::Failed, Some(&failure))
            .unwrap();

        let reset = storage.reset_failed_articles(2).unwrap();
        assert_eq!(reset, 1);
        assert_eq!(
            storage.get_article(a.id).unwrap().status,
            ArticleStatus::Pending
        );
        assert_eq!(
            storage.get_article(b.id).unwrap().status,
            ArticleStatus::Failed
        );
    }

    #[test]
    fn test_comment_pages_roundtrip_for_resume() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (article, _) = storage.register_article(URL_A, None).unwrap();
        let records = vec![record("1", 1, 0), record("2", 1, 1)];

        storage
            .record_comment_page(&article.article_id, 1, PageFetchStatus::Done, &records)
            .unwrap();
        storage
            .record_comment_page(&article.article_id, 2, PageFetchStatus::Failed, &[])
            .unwrap();

        let done = storage.completed_comment_pages(&article.article_id).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].page_number, 1);
        assert_eq!(done[0].record_count, 2);
        assert_eq!(done[0].records, records);

        assert_eq!(storage.count_comment_pages(PageFetchStatus::Done).unwrap(), 1);
        assert_eq!(storage.count_comment_pages(PageFetchStatus::Failed).unwrap(), 1);
    }

    #[test]
    fn test_done_page_never_overwritten() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (article, _) = storage.register_article(URL_A, None).unwrap();
        let original = vec![record("1", 1, 0), record("2", 1, 1)];

        storage
            .record_comment_page(&article.article_id, 1, PageFetchStatus::Done, &original)
            .unwrap();
        storage
            .record_comment_page(&article.article_id, 1, PageFetchStatus::Done, &[record("9", 1, 0)])
            .unwrap();
        storage
            .record_comment_page(&article.article_id, 1, PageFetchStatus::Failed, &[])
            .unwrap();

        let done = storage.completed_comment_pages(&article.article_id).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].records, original);
    }

    #[test]
    fn test_failed_page_upgrades_to_done() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (article, _) = storage.register_article(URL_A, None).unwrap();

        storage
            .record_comment_page(&article.article_id, 2, PageFetchStatus::Failed, &[])
            .unwrap();
        storage
            .record_comment_page(&article.article_id, 2, PageFetchStatus::Done, &[record("5", 2, 0)])
            .unwrap();

        let done = storage.completed_comment_pages(&article.article_id).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].page_number, 2);
    }

    #[test]
    fn test_mark_comment_id_seen() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        assert!(!storage.is_comment_id_seen("100").unwrap());
        assert!(storage.mark_comment_id_seen("100", "a").unwrap());
        assert!(!storage.mark_comment_id_seen("100", "b").unwrap());
        assert!(storage.is_comment_id_seen("100").unwrap());
        assert_eq!(storage.count_seen_comments().unwrap(), 1);
    }

    #[test]
    fn test_claim_comment_ids_excludes_other_articles() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let ids = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let first = storage.claim_comment_ids("a", &ids(&["1", "2", "3"])).unwrap();
        assert_eq!(first.len(), 3);

        // Replaying the same article keeps ownership
        let replay = storage.claim_comment_ids("a", &ids(&["1", "2", "3", "4"])).unwrap();
        assert_eq!(replay.len(), 4);

        let other = storage.claim_comment_ids("b", &ids(&["3", "4", "5"])).unwrap();
        assert_eq!(other, HashSet::from(["5".to_string()]));
    }

    #[test]
    fn test_archive_months() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        assert!(!storage.is_archive_month_complete("2017-01").unwrap());
        storage.mark_archive_month_complete("2017-01", 42).unwrap();
        storage.mark_archive_month_complete("2017-01", 43).unwrap();
        assert!(storage.is_archive_month_complete("2017-01").unwrap());
        assert_eq!(storage.count_completed_months().unwrap(), 1);
    }

    #[test]
    fn test_warnings() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        storage
            .record_warning(Some("a"), "orphaned_comment", "comment 9 -> 999")
            .unwrap();
        storage
            .record_warning(Some("a"), "orphaned_comment", "comment 10 -> 998")
            .unwrap();
        storage
            .record_warning(None, "parent_cycle", "comments 1, 2")
            .unwrap();

        let counts = storage.count_warnings_by_kind().unwrap();
        assert_eq!(
            counts,
            vec![
                ("orphaned_comment".to_string(), 2),
                ("parent_cycle".to_string(), 1)
            ]
        );

        let recent = storage.list_warnings(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, "parent_cycle");
        assert!(recent[0].article_id.is_none());
    }

    #[test]
    fn test_emission_summary() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (a, _) = storage.register_article(URL_A, None).unwrap();
        let (b, _) = storage.register_article(URL_B, None).unwrap();

        storage.set_article_metadata(a.id, Some("Inauguration"), Some(12)).unwrap();
        storage.mark_comments_emitted(a.id, 12, false).unwrap();
        storage.mark_comments_emitted(b.id, 3, true).unwrap();

        let reloaded = storage.get_article(a.id).unwrap();
        assert_eq!(reloaded.title.as_deref(), Some("Inauguration"));
        assert_eq!(reloaded.comment_count_hint, Some(12));
        assert_eq!(storage.count_comments_emitted().unwrap(), 15);
        assert_eq!(storage.count_partial_articles().unwrap(), 1);
    }
}
