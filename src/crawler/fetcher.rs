//! Rate-limited HTTP fetcher
//!
//! This module handles all HTTP requests for the harvester, including:
//! - A transport seam (`HttpTransport`) with a reqwest implementation
//! - A single process-wide politeness gate shared by every worker
//! - Retry with exponential backoff and jitter for transient failures
//! - Error classification

use crate::state::RetryState;
use crate::ErrorClass;
use async_trait::async_trait;
use rand::Rng;
use reqwest::{redirect::Policy, Client};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors returned by a fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("Network error: {0}")]
    Network(String),
}

impl FetchError {
    /// Returns true for failures worth another attempt
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 404 | Immediate failure |
    /// | HTTP 429 | Retry with backoff |
    /// | HTTP 5xx | Retry with backoff |
    /// | Timeout | Retry with backoff |
    /// | Connection error | Retry with backoff |
    /// | Other 4xx | Immediate failure |
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::Http(code) => *code == 429 || (500..600).contains(code),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http(404))
    }

    pub fn class(&self) -> ErrorClass {
        if self.is_retryable() {
            ErrorClass::Transient
        } else {
            ErrorClass::PermanentSkip
        }
    }
}

/// A raw HTTP response, before any retry policy is applied
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub final_url: String,
    pub body: String,
}

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub final_url: String,
    pub status_code: u16,
    pub body: String,
}

/// Performs exactly one GET request with no rate limiting or retries
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// `HttpTransport` backed by a reqwest client
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds the transport with the configured user agent and timeout
    ///
    /// # Arguments
    ///
    /// * `user_agent` - User-Agent header sent with every request
    /// * `timeout` - Whole-request timeout
    ///
    /// # Returns
    ///
    /// * `Ok(ReqwestTransport)` - Successfully built HTTP client
    /// * `Err(reqwest::Error)` - Failed to build client
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .redirect(Policy::limited(10))
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify_reqwest)?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(classify_reqwest)?;
        Ok(HttpResponse {
            status,
            final_url,
            body,
        })
    }
}

fn classify_reqwest(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}

#[derive(Debug, Default)]
struct GateTimes {
    last_dispatch: Option<Instant>,
    last_completion: Option<Instant>,
}

/// Process-wide minimum delay between requests
///
/// Each dispatch waits until `delay` has passed since the later of the
/// previous dispatch and the previous completion. With a single worker this
/// is exactly "delay after the last response"; with several workers it bounds
/// the dispatch rate no matter how many requests are in flight.
pub struct PolitenessGate {
    delay: Duration,
    queue: tokio::sync::Mutex<()>,
    times: Mutex<GateTimes>,
}

impl PolitenessGate {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            queue: tokio::sync::Mutex::new(()),
            times: Mutex::new(GateTimes::default()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn ready_at(&self) -> Option<Instant> {
        let times = self.times.lock().unwrap_or_else(|e| e.into_inner());
        let anchor = match (times.last_dispatch, times.last_completion) {
            (Some(d), Some(c)) => Some(d.max(c)),
            (d, c) => d.or(c),
        };
        anchor.map(|a| a + self.delay)
    }

    /// Waits for this caller's turn, then records the dispatch
    pub async fn wait_turn(&self) {
        let _queue = self.queue.lock().await;

        // A completion may land while we sleep and push the deadline out
        while let Some(ready) = self.ready_at() {
            if Instant::now() >= ready {
                break;
            }
            tokio::time::sleep_until(ready).await;
        }

        let mut times = self.times.lock().unwrap_or_else(|e| e.into_inner());
        times.last_dispatch = Some(Instant::now());
    }

    /// Records that a dispatched request has finished
    pub fn complete(&self) {
        let mut times = self.times.lock().unwrap_or_else(|e| e.into_inner());
        times.last_completion = Some(Instant::now());
    }
}

/// Exponential backoff parameters for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based)
    ///
    /// `min(base * 2^attempt, cap)` plus a uniform jitter in `[0, base)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(30));
        let exponential = self.base_delay.saturating_mul(factor).min(self.max_backoff);

        let base_secs = self.base_delay.as_secs_f64();
        let jitter = if base_secs > 0.0 {
            rand::thread_rng().gen_range(0.0..base_secs)
        } else {
            0.0
        };

        exponential + Duration::from_secs_f64(jitter)
    }
}

/// Fetcher applying the politeness gate and retry policy over a transport
#[derive(Clone)]
pub struct RateLimitedFetcher {
    transport: Arc<dyn HttpTransport>,
    gate: Arc<PolitenessGate>,
    policy: RetryPolicy,
}

impl RateLimitedFetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        gate: Arc<PolitenessGate>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            gate,
            policy,
        }
    }

    /// Fetches a URL, retrying transient failures
    ///
    /// # Returns
    ///
    /// * `Ok(FetchedPage)` - A 2xx response
    /// * `Err(FetchError::Http(404))` - Immediately, without retries
    /// * `Err(FetchError)` - Any other non-retryable error, or the last
    ///   error once the retry budget is spent
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut retry = RetryState::new();

        loop {
            let wait = retry.remaining_wait(std::time::Instant::now());
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            self.gate.wait_turn().await;
            tracing::debug!("GET {} (attempt {})", url, retry.attempt + 1);
            let result = self.transport.get(url).await;
            self.gate.complete();

            let error = match result {
                Ok(response) if (200..300).contains(&response.status) => {
                    return Ok(FetchedPage {
                        url: url.to_string(),
                        final_url: response.final_url,
                        status_code: response.status,
                        body: response.body,
                    });
                }
                Ok(response) => FetchError::Http(response.status),
                Err(e) => e,
            };

            if !error.is_retryable() {
                tracing::debug!("{} failed permanently: {}", url, error);
                return Err(error);
            }

            let backoff = self.policy.backoff_for(retry.attempt);
            retry.record_failure(error.to_string(), backoff, std::time::Instant::now());

            if !retry.can_retry(self.policy.max_retries) {
                tracing::warn!(
                    "Giving up on {} after {} attempts: {}",
                    url,
                    retry.attempt,
                    error
                );
                return Err(error);
            }

            tracing::warn!(
                "Transient failure for {} ({}), retrying in {:.1}s",
                url,
                error,
                backoff.as_secs_f64()
            );
        }
    }
}
