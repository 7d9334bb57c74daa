//! Scheduler driving pending articles through a bounded worker pool
//!
//! This module handles:
//! - Claiming pending articles from the progress store in batches
//! - Global concurrency limiting via a semaphore
//! - Never dispatching an article twice within one run
//! - Honoring the stop signal: no new dispatches, in-flight articles finish
//!
//! Request pacing is not decided here. Every worker shares one fetcher and
//! therefore one politeness gate, so extra workers only overlap waiting.

use crate::crawler::article::{ArticleOutcome, ArticleProcessor};
use crate::storage::{lock_storage, ArticleRecord, SharedStorage, Storage};
use crate::HarvestError;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};

/// Totals for one scheduling pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub attempted: u32,
    pub scraped: u32,
    pub failed: u32,
    pub unavailable: u32,

    /// Scraped articles missing at least one comment page
    pub partial: u32,

    pub comments_emitted: u64,

    /// The stop signal ended the pass early
    pub stopped: bool,
}

impl ScheduleReport {
    fn absorb(&mut self, outcome: &ArticleOutcome) {
        match outcome {
            ArticleOutcome::Scraped { comments, partial } => {
                self.scraped += 1;
                self.comments_emitted += u64::from(*comments);
                if *partial {
                    self.partial += 1;
                }
            }
            ArticleOutcome::Failed { .. } => self.failed += 1,
            ArticleOutcome::Unavailable => self.unavailable += 1,
        }
    }
}

type WorkerResult = (i64, Result<ArticleOutcome, HarvestError>);

/// Scheduler manages the worker pool over the pending article queue
pub struct Scheduler {
    processor: Arc<ArticleProcessor>,
    storage: SharedStorage,

    /// Global semaphore bounding articles in flight
    workers: Arc<Semaphore>,
    worker_count: usize,
    batch_size: u32,

    /// Stop after this many articles have been dispatched
    limit: Option<usize>,
    stop: watch::Receiver<bool>,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `processor` - Shared per-article processor
    /// * `storage` - Progress store to claim pending articles from
    /// * `worker_count` - Articles processed concurrently (at least 1)
    /// * `batch_size` - Pending articles claimed per store query
    /// * `limit` - Optional cap on articles dispatched in this run
    /// * `stop` - Cooperative stop signal
    pub fn new(
        processor: Arc<ArticleProcessor>,
        storage: SharedStorage,
        worker_count: usize,
        batch_size: u32,
        limit: Option<usize>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let worker_count = worker_count.max(1);
        Self {
            processor,
            storage,
            workers: Arc::new(Semaphore::new(worker_count)),
            worker_count,
            batch_size: batch_size.max(1),
            limit,
            stop,
        }
    }

    fn stopped(&self) -> bool {
        *self.stop.borrow()
    }

    fn limit_reached(&self, dispatched: usize) -> bool {
        self.limit.is_some_and(|limit| dispatched >= limit)
    }

    /// Processes pending articles until none are left
    ///
    /// # Returns
    ///
    /// * `Ok(ScheduleReport)` - The queue drained, the limit was reached or
    ///   the stop signal fired
    /// * `Err(HarvestError)` - A fatal error; remaining workers are aborted
    pub async fn run(&self) -> Result<ScheduleReport, HarvestError> {
        let mut report = ScheduleReport::default();
        let mut attempted: HashSet<i64> = HashSet::new();
        let mut tasks: JoinSet<WorkerResult> = JoinSet::new();

        let result = self.dispatch_loop(&mut report, &mut attempted, &mut tasks).await;
        if let Err(e) = result {
            tracing::error!("Aborting scheduler: {}", e);
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            return Err(e);
        }

        while let Some(joined) = tasks.join_next().await {
            Self::collect(joined, &mut report)?;
        }

        report.stopped = self.stopped();
        Ok(report)
    }

    async fn dispatch_loop(
        &self,
        report: &mut ScheduleReport,
        attempted: &mut HashSet<i64>,
        tasks: &mut JoinSet<WorkerResult>,
    ) -> Result<(), HarvestError> {
        loop {
            if self.stopped() {
                tracing::info!("Stop requested, waiting for {} in-flight articles", tasks.len());
                return Ok(());
            }
            if self.limit_reached(attempted.len()) {
                tracing::info!("Article limit reached");
                return Ok(());
            }

            // Articles still in flight are pending too; over-claim to see past them
            let claim = self.batch_size + self.worker_count as u32;
            let batch: Vec<ArticleRecord> = lock_storage(&self.storage)?
                .claim_pending_articles(claim)?
                .into_iter()
                .filter(|a| !attempted.contains(&a.id))
                .collect();

            if batch.is_empty() {
                match tasks.join_next().await {
                    Some(joined) => {
                        Self::collect(joined, report)?;
                        continue;
                    }
                    None => {
                        tracing::info!("No pending articles left");
                        return Ok(());
                    }
                }
            }

            for article in batch {
                let permit = loop {
                    tokio::select! {
                        acquired = self.workers.clone().acquire_owned() => break acquired,
                        Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                            Self::collect(joined, report)?;
                        }
                    }
                };
                let Ok(permit) = permit else {
                    return Ok(());
                };

                if self.stopped() || self.limit_reached(attempted.len()) {
                    break;
                }

                attempted.insert(article.id);
                report.attempted += 1;

                let processor = Arc::clone(&self.processor);
                tasks.spawn(async move {
                    let _permit = permit;
                    let outcome = processor.process(&article).await;
                    (article.id, outcome)
                });
            }
        }
    }

    fn collect(
        joined: Result<WorkerResult, JoinError>,
        report: &mut ScheduleReport,
    ) -> Result<(), HarvestError> {
        match joined {
            Ok((_, Ok(outcome))) => {
                report.absorb(&outcome);
                Ok(())
            }
            Ok((id, Err(e))) if e.is_fatal() => {
                tracing::error!("Fatal error while processing article {}: {}", id, e);
                Err(e)
            }
            Ok((id, Err(e))) => {
                // Left pending; the next run picks it up again
                tracing::error!("Article {} was not resolved: {}", id, e);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Worker task ended abnormally: {}", e);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::extract::{ArticleFields, WordPressExtractor};
    use crate::crawler::fetcher::{
        FetchError, HttpResponse, HttpTransport, PolitenessGate, RateLimitedFetcher, RetryPolicy,
    };
    use crate::output::{ArticleWriter, OutputResult};
    use crate::state::ArticleStatus;
    use crate::storage::SqliteStorage;
    use crate::thread::CommentNode;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use url::Url;

    /// Serves the same article page for every URL ending in a dated slug
    struct ArticleSite {
        requests: AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for ArticleSite {
        async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if url.contains("missing") {
                return Err(FetchError::Http(404));
            }
            Ok(HttpResponse {
                status: 200,
                final_url: url.to_string(),
                body: r#"<article><h1 class="entry-title">T</h1>
                         <div class="entry-content"><p>Body</p></div></article>"#
                    .to_string(),
            })
        }
    }

    struct NullWriter;

    impl ArticleWriter for NullWriter {
        fn write_article(
            &self,
            _article: &ArticleRecord,
            _fields: &ArticleFields,
            _comments: &[CommentNode],
        ) -> OutputResult<()> {
            Ok(())
        }
    }

    fn setup(urls: &[&str]) -> (SharedStorage, Arc<ArticleProcessor>, Arc<ArticleSite>) {
        let storage: SharedStorage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        for url in urls {
            storage.lock().unwrap().register_article(url, None).unwrap();
        }

        let site = Arc::new(ArticleSite {
            requests: AtomicUsize::new(0),
        });
        let fetcher = RateLimitedFetcher::new(
            site.clone(),
            Arc::new(PolitenessGate::new(Duration::from_millis(1))),
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
            },
        );
        let extractor =
            Arc::new(WordPressExtractor::new(Url::parse("https://example.com/").unwrap()).unwrap());
        let processor = Arc::new(ArticleProcessor::new(
            fetcher,
            extractor,
            Arc::new(NullWriter),
            storage.clone(),
            32,
        ));
        (storage, processor, site)
    }

    const URLS: [&str; 3] = [
        "https://example.com/2017/01/20/one/",
        "https://example.com/2017/01/21/missing/",
        "https://example.com/2017/01/22/three/",
    ];

    #[tokio::test]
    async fn test_processes_every_pending_article_once() {
        let (storage, processor, site) = setup(&URLS);
        let (_tx, rx) = watch::channel(false);

        let scheduler = Scheduler::new(processor, storage.clone(), 2, 1, None, rx);
        let report = scheduler.run().await.unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.scraped, 2);
        assert_eq!(report.unavailable, 1);
        assert!(!report.stopped);
        assert_eq!(site.requests.load(Ordering::SeqCst), 3);

        let storage = storage.lock().unwrap();
        assert_eq!(storage.count_articles_by_status(ArticleStatus::Pending).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_limit_caps_dispatches() {
        let (storage, processor, _site) = setup(&URLS);
        let (_tx, rx) = watch::channel(false);

        let scheduler = Scheduler::new(processor, storage.clone(), 1, 10, Some(1), rx);
        let report = scheduler.run().await.unwrap();

        assert_eq!(report.attempted, 1);
        let storage = storage.lock().unwrap();
        assert_eq!(storage.count_articles_by_status(ArticleStatus::Pending).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stop_signal_prevents_dispatch() {
        let (storage, processor, site) = setup(&URLS);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let scheduler = Scheduler::new(processor, storage, 1, 10, None, rx);
        let report = scheduler.run().await.unwrap();

        assert_eq!(report.attempted, 0);
        assert!(report.stopped);
        assert_eq!(site.requests.load(Ordering::SeqCst), 0);
    }
}
