//! Per-article processing: body, comment pages, reconstruction, output
//!
//! An article moves through `ArticlePhase` in order. Only the final phase
//! writes the article's status; every earlier step either continues or
//! resolves the article as failed or unavailable. Comment pages are
//! recorded as they are fetched, so a retried article only fetches the
//! pages an earlier attempt did not finish.

use crate::crawler::extract::{ArticleFields, HtmlExtractor};
use crate::crawler::fetcher::{FetchError, RateLimitedFetcher};
use crate::output::ArticleWriter;
use crate::state::{ArticleStatus, PageFetchStatus};
use crate::storage::{lock_storage, ArticleFailure, ArticleRecord, SharedStorage, Storage};
use crate::thread::{check_reconciliation, reconstruct, DataQualityWarning, RawCommentRecord};
use crate::url::comment_page_url;
use crate::{ErrorClass, HarvestError, UrlError};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Processing phase of one article
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticlePhase {
    FetchingBody,
    FetchingComments,
    Reconstructing,
    Writing,
    Scraped,
    Failed,
    Unavailable,
}

impl ArticlePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Scraped | Self::Failed | Self::Unavailable)
    }
}

impl fmt::Display for ArticlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FetchingBody => "fetching body",
            Self::FetchingComments => "fetching comments",
            Self::Reconstructing => "reconstructing",
            Self::Writing => "writing",
            Self::Scraped => "scraped",
            Self::Failed => "failed",
            Self::Unavailable => "unavailable",
        };
        write!(f, "{}", name)
    }
}

/// How an article attempt resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleOutcome {
    Scraped { comments: u32, partial: bool },
    Failed { phase: ArticlePhase, class: ErrorClass },
    Unavailable,
}

/// Comment records gathered across an article's pages
#[derive(Debug, Default)]
struct CollectedComments {
    records: Vec<RawCommentRecord>,
    partial: bool,
}

/// Processes claimed articles end to end
pub struct ArticleProcessor {
    fetcher: RateLimitedFetcher,
    extractor: Arc<dyn HtmlExtractor>,
    writer: Arc<dyn ArticleWriter>,
    storage: SharedStorage,
    max_depth: u32,
}

impl ArticleProcessor {
    pub fn new(
        fetcher: RateLimitedFetcher,
        extractor: Arc<dyn HtmlExtractor>,
        writer: Arc<dyn ArticleWriter>,
        storage: SharedStorage,
        max_depth: u32,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            writer,
            storage,
            max_depth,
        }
    }

    /// Runs one pending article to a terminal status
    ///
    /// # Returns
    ///
    /// * `Ok(ArticleOutcome)` - The status the article was moved to
    /// * `Err(HarvestError)` - The progress store failed; the run must stop
    pub async fn process(&self, article: &ArticleRecord) -> Result<ArticleOutcome, HarvestError> {
        tracing::debug!("{}: {}", article.article_id, ArticlePhase::FetchingBody);
        let body = match self.fetcher.fetch(&article.url).await {
            Ok(page) => page.body,
            Err(e) => return self.fetch_failed(article, ArticlePhase::FetchingBody, e),
        };

        let fields = match self.extract_fields(&article.url, &body) {
            Ok(fields) => fields,
            Err(e) => {
                let failure = ArticleFailure::new(ErrorClass::PermanentSkip, e.to_string());
                return self.resolve_failed(article, ArticlePhase::FetchingBody, failure);
            }
        };

        let title = Some(fields.title.as_str()).filter(|t| !t.is_empty());
        lock_storage(&self.storage)?.set_article_metadata(article.id, title, fields.comment_count)?;

        tracing::debug!("{}: {}", article.article_id, ArticlePhase::FetchingComments);
        let collected = self.collect_comments(article, &body).await?;

        tracing::debug!("{}: {}", article.article_id, ArticlePhase::Reconstructing);
        let (records, mut warnings) = self.claim_records(article, collected.records)?;
        let thread = reconstruct(records, self.max_depth);
        warnings.extend(thread.warnings.iter().cloned());
        if let Some(mismatch) = check_reconciliation(fields.comment_count, thread.len()) {
            warnings.push(mismatch);
        }
        self.record_warnings(article, &warnings)?;

        tracing::debug!("{}: {}", article.article_id, ArticlePhase::Writing);
        if let Err(e) = self.writer.write_article(article, &fields, &thread.nodes) {
            let failure = ArticleFailure::new(ErrorClass::PermanentSkip, e.to_string());
            return self.resolve_failed(article, ArticlePhase::Writing, failure);
        }

        let comments = thread.len() as u32;
        {
            let mut storage = lock_storage(&self.storage)?;
            storage.mark_comments_emitted(article.id, comments, collected.partial)?;
            storage.mark_article_result(article.id, ArticleStatus::Scraped, None)?;
        }

        tracing::info!(
            "Scraped {} ({} comments{})",
            article.article_id,
            comments,
            if collected.partial { ", partial" } else { "" }
        );
        Ok(ArticleOutcome::Scraped {
            comments,
            partial: collected.partial,
        })
    }

    fn extract_fields(&self, url: &str, body: &str) -> Result<ArticleFields, HarvestError> {
        let page_url = Url::parse(url).map_err(|e| UrlError::Parse(e.to_string()))?;
        Ok(self.extractor.extract_article_fields(body, &page_url)?)
    }

    /// Gathers records from every comment page, reusing pages already done
    async fn collect_comments(
        &self,
        article: &ArticleRecord,
        body: &str,
    ) -> Result<CollectedComments, HarvestError> {
        let done: BTreeMap<u32, Vec<RawCommentRecord>> = lock_storage(&self.storage)?
            .completed_comment_pages(&article.article_id)?
            .into_iter()
            .map(|page| (page.page_number, page.records))
            .collect();

        let mut collected = CollectedComments::default();
        let mut total_pages = self.extractor.extract_pagination_info(body);
        let mut page = 1;

        while page <= total_pages {
            if let Some(records) = done.get(&page) {
                tracing::debug!("{}: comment page {} already recorded", article.article_id, page);
                collected.records.extend(records.iter().cloned());
                page += 1;
                continue;
            }

            let html = if page == 1 {
                body.to_string()
            } else {
                let url = comment_page_url(&article.url, page);
                match self.fetcher.fetch(&url).await {
                    Ok(fetched) => fetched.body,
                    Err(e) => {
                        tracing::warn!(
                            "{}: comment page {} failed ({}), continuing with partial comments",
                            article.article_id,
                            page,
                            e
                        );
                        lock_storage(&self.storage)?.record_comment_page(
                            &article.article_id,
                            page,
                            PageFetchStatus::Failed,
                            &[],
                        )?;
                        collected.partial = true;
                        break;
                    }
                }
            };

            // New comments can push the thread onto more pages mid-crawl
            total_pages = total_pages.max(self.extractor.extract_pagination_info(&html));

            let records = self.extractor.extract_comment_records(&html, page);
            lock_storage(&self.storage)?.record_comment_page(
                &article.article_id,
                page,
                PageFetchStatus::Done,
                &records,
            )?;
            collected.records.extend(records);
            page += 1;
        }

        // Pages recorded by an earlier attempt beyond the current page count
        for (number, records) in done.range(page..) {
            tracing::debug!("{}: keeping earlier comment page {}", article.article_id, number);
            collected.records.extend(records.iter().cloned());
        }

        Ok(collected)
    }

    /// Drops records whose comment id another article already emitted
    fn claim_records(
        &self,
        article: &ArticleRecord,
        records: Vec<RawCommentRecord>,
    ) -> Result<(Vec<RawCommentRecord>, Vec<DataQualityWarning>), HarvestError> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = records
            .iter()
            .filter(|r| seen.insert(r.comment_id.clone()))
            .map(|r| r.comment_id.clone())
            .collect();

        let owned = lock_storage(&self.storage)?.claim_comment_ids(&article.article_id, &ids)?;

        let warnings = ids
            .iter()
            .filter(|id| !owned.contains(*id))
            .map(|id| DataQualityWarning::CrossArticleDuplicate {
                comment_id: id.clone(),
            })
            .collect();
        let kept = records
            .into_iter()
            .filter(|r| owned.contains(&r.comment_id))
            .collect();

        Ok((kept, warnings))
    }

    fn record_warnings(
        &self,
        article: &ArticleRecord,
        warnings: &[DataQualityWarning],
    ) -> Result<(), HarvestError> {
        if warnings.is_empty() {
            return Ok(());
        }

        let mut storage = lock_storage(&self.storage)?;
        for warning in warnings {
            tracing::warn!("{}: {}", article.article_id, warning);
            storage.record_warning(Some(&article.article_id), warning.kind(), &warning.to_string())?;
        }
        Ok(())
    }

    fn fetch_failed(
        &self,
        article: &ArticleRecord,
        phase: ArticlePhase,
        error: FetchError,
    ) -> Result<ArticleOutcome, HarvestError> {
        let failure = ArticleFailure::new(error.class(), error.to_string());

        if error.is_not_found() {
            tracing::info!("{} is unavailable: {}", article.url, error);
            lock_storage(&self.storage)?.mark_article_result(
                article.id,
                ArticleStatus::Unavailable,
                Some(&failure),
            )?;
            return Ok(ArticleOutcome::Unavailable);
        }

        self.resolve_failed(article, phase, failure)
    }

    fn resolve_failed(
        &self,
        article: &ArticleRecord,
        phase: ArticlePhase,
        failure: ArticleFailure,
    ) -> Result<ArticleOutcome, HarvestError> {
        tracing::error!(
            "{} failed while {}: {}",
            article.article_id,
            phase,
            failure.message
        );
        lock_storage(&self.storage)?.mark_article_result(
            article.id,
            ArticleStatus::Failed,
            Some(&failure),
        )?;
        Ok(ArticleOutcome::Failed {
            phase,
            class: failure.class,
        })
    }
}
