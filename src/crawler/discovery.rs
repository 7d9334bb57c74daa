//! Discovery driver: walks monthly archive listings into the progress store
//!
//! Every month of the configured window is visited once. A month is recorded
//! complete only after its listing ran out (an empty page or a 404), so a
//! run interrupted halfway through a month walks that month again next time;
//! re-registering its articles is a no-op.

use crate::crawler::extract::HtmlExtractor;
use crate::crawler::fetcher::RateLimitedFetcher;
use crate::storage::{lock_storage, SharedStorage, Storage};
use crate::url::{archive_url, date_from_url, month_from_url};
use crate::HarvestError;
use chrono::{Datelike, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use url::Url;

/// Totals for one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Months whose listing was walked in this pass
    pub months_scanned: u32,

    /// Months skipped because an earlier run completed them
    pub months_skipped: u32,

    /// In-range article links seen on listing pages
    pub articles_found: u32,

    /// Articles registered for the first time
    pub new_articles: u32,

    /// Listing pages fetched
    pub pages_fetched: u32,

    /// The stop signal ended the pass early
    pub stopped: bool,
}

#[derive(Debug, Default)]
struct MonthOutcome {
    found: u32,
    new: u32,
    pages: u32,
    complete: bool,
}

/// Returns every `(year, month)` touched by the inclusive date range
pub fn months_in_range(start: NaiveDate, end: NaiveDate) -> Vec<(i32, u32)> {
    let mut months = Vec::new();
    if start > end {
        return months;
    }

    let (mut year, mut month) = (start.year(), start.month());
    while (year, month) <= (end.year(), end.month()) {
        months.push((year, month));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    months
}

/// Key under which a month is recorded in the store
fn month_key(year: i32, month: u32) -> String {
    format!("{:04}-{:02}", year, month)
}

/// A month still in progress can gain articles, so it is never closed
fn month_has_ended(year: i32, month: u32, today: NaiveDate) -> bool {
    (year, month) < (today.year(), today.month())
}

/// Walks archive listings and registers the articles they link to
pub struct DiscoveryDriver {
    fetcher: RateLimitedFetcher,
    extractor: Arc<dyn HtmlExtractor>,
    storage: SharedStorage,
    base_url: String,
    start: NaiveDate,
    end: NaiveDate,
    max_pages: u32,
    stop: watch::Receiver<bool>,
}

impl DiscoveryDriver {
    /// Creates a discovery driver
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Shared rate-limited fetcher
    /// * `extractor` - Listing page link extraction
    /// * `storage` - Progress store receiving new articles
    /// * `base_url` - Site root the archive URLs hang off
    /// * `range` - Inclusive publication date window
    /// * `max_pages` - Listing pages walked per month at most
    /// * `stop` - Cooperative stop signal
    pub fn new(
        fetcher: RateLimitedFetcher,
        extractor: Arc<dyn HtmlExtractor>,
        storage: SharedStorage,
        base_url: &str,
        range: (NaiveDate, NaiveDate),
        max_pages: u32,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            storage,
            base_url: base_url.trim_end_matches('/').to_string(),
            start: range.0,
            end: range.1,
            max_pages,
            stop,
        }
    }

    fn stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Listings also link to posts outside the window (sidebars, neighbours)
    fn in_window(&self, url: &Url) -> bool {
        if let Some(date) = date_from_url(url) {
            return date >= self.start && date <= self.end;
        }
        match month_from_url(url) {
            Some(month) => {
                month >= (self.start.year(), self.start.month())
                    && month <= (self.end.year(), self.end.month())
            }
            None => true,
        }
    }

    /// Walks every month of the window
    ///
    /// # Returns
    ///
    /// * `Ok(DiscoveryReport)` - Discovery finished or was stopped
    /// * `Err(HarvestError)` - The progress store failed
    pub async fn run(&self) -> Result<DiscoveryReport, HarvestError> {
        let mut report = DiscoveryReport::default();
        let today = Utc::now().date_naive();

        for (year, month) in months_in_range(self.start, self.end) {
            if self.stopped() {
                tracing::info!("Stop requested, ending discovery before {}", month_key(year, month));
                report.stopped = true;
                break;
            }

            let key = month_key(year, month);
            let done = lock_storage(&self.storage)?.is_archive_month_complete(&key)?;
            if done {
                tracing::debug!("Archive month {} already complete, skipping", key);
                report.months_skipped += 1;
                continue;
            }

            let outcome = self.discover_month(year, month).await?;
            report.months_scanned += 1;
            report.articles_found += outcome.found;
            report.new_articles += outcome.new;
            report.pages_fetched += outcome.pages;

            if outcome.complete && month_has_ended(year, month, today) {
                lock_storage(&self.storage)?.mark_archive_month_complete(&key, outcome.found)?;
            }

            tracing::info!(
                "Archive {}: {} articles ({} new) over {} pages",
                key,
                outcome.found,
                outcome.new,
                outcome.pages
            );
        }

        if self.stopped() {
            report.stopped = true;
        }
        Ok(report)
    }

    async fn discover_month(&self, year: i32, month: u32) -> Result<MonthOutcome, HarvestError> {
        let mut outcome = MonthOutcome::default();

        for page in 1..=self.max_pages {
            if self.stopped() {
                return Ok(outcome);
            }

            let url = archive_url(&self.base_url, year, month, page);
            let fetched = match self.fetcher.fetch(&url).await {
                Ok(fetched) => fetched,
                Err(e) if e.is_not_found() => {
                    tracing::debug!("Archive listing ends at {} (404)", url);
                    outcome.complete = true;
                    return Ok(outcome);
                }
                Err(e) => {
                    tracing::warn!("Failed to fetch archive page {}: {}", url, e);
                    return Ok(outcome);
                }
            };
            outcome.pages += 1;

            let Ok(page_url) = Url::parse(&fetched.final_url) else {
                tracing::warn!("Archive page {} redirected to an invalid URL", url);
                return Ok(outcome);
            };
            let links = self.extractor.extract_article_links(&fetched.body, &page_url);
            if links.is_empty() {
                outcome.complete = true;
                return Ok(outcome);
            }

            let mut storage = lock_storage(&self.storage)?;
            for link in links {
                if !self.in_window(&link.url) {
                    continue;
                }
                let published = date_from_url(&link.url);

                outcome.found += 1;
                let (record, is_new) = storage.register_article(link.url.as_str(), published)?;
                if is_new {
                    outcome.new += 1;
                    tracing::debug!("Discovered {} ({})", record.article_id, link.title);
                }
            }
        }

        tracing::warn!(
            "Archive {} still had articles after {} pages; raise max-archive-pages to walk further",
            month_key(year, month),
            self.max_pages
        );
        Ok(outcome)
    }
}
