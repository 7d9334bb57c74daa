use std::time::{Duration, Instant};

/// Tracks the retry progress of a single logical request
///
/// The fetcher owns one of these per call to `fetch`, so retry bookkeeping is
/// explicit rather than hidden in a recursive loop.
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Number of attempts already made
    pub attempt: u32,

    /// Earliest instant at which the next attempt may be dispatched
    pub next_eligible_at: Option<Instant>,

    /// Description of the most recent failure
    pub last_error: Option<String>,
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            next_eligible_at: None,
            last_error: None,
        }
    }

    /// Records a failed attempt and schedules the next one after `backoff`
    ///
    /// # Arguments
    ///
    /// * `error` - Human-readable failure description
    /// * `backoff` - Delay before the next attempt becomes eligible
    /// * `now` - The current time instant
    pub fn record_failure(&mut self, error: impl Into<String>, backoff: Duration, now: Instant) {
        self.attempt += 1;
        self.last_error = Some(error.into());
        self.next_eligible_at = Some(now + backoff);
    }

    /// Returns true while retries remain under `max_retries`
    ///
    /// `attempt` counts every try, so the first request plus `max_retries`
    /// retries are permitted.
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.attempt <= max_retries
    }

    /// Time left until the next attempt is eligible
    pub fn remaining_wait(&self, now: Instant) -> Duration {
        match self.next_eligible_at {
            Some(at) => at.saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}
