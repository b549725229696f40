//! Poll cadence and bounded retry for status fetches.
//!
//! [`PollPolicy`] decides how long the waiter sleeps between cycles;
//! [`RetryPolicy`] decides how often a failed fetch is repeated before the
//! failure is handed back as fatal. [`Poller`] combines both with request
//! chunking.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::action::{Action, ActionId};
use crate::api::{ActionSource, ApiError};

/// Upper bound on IDs per status request; larger batches are split.
pub const MAX_IDS_PER_REQUEST: usize = 25;

/// Interval between poll cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Base delay between two cycles.
    pub interval: Duration,
    /// Upper bound of the random delay added to `interval`, so parallel
    /// invocations do not hit the API in lockstep.
    pub jitter: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            jitter: Duration::from_millis(100),
        }
    }
}

impl PollPolicy {
    pub fn next_interval(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(fastrand::u64(0..=jitter_ms))
    }
}

/// Bounded exponential backoff for transport failures of the fetch itself.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt; 0 means fail immediately.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// delay = base_delay * 2^(attempt - 1), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Issues status fetches for the pending IDs of one wait call.
#[derive(Debug, Clone, Default)]
pub struct Poller {
    pub poll: PollPolicy,
    pub retry: RetryPolicy,
}

impl Poller {
    pub fn new(poll: PollPolicy, retry: RetryPolicy) -> Self {
        Self { poll, retry }
    }

    pub fn next_interval(&self) -> Duration {
        self.poll.next_interval()
    }

    /// Fetch fresh snapshots for `ids`, at most [`MAX_IDS_PER_REQUEST`] per request.
    ///
    /// Retryable errors are retried per chunk; the first error that is not
    /// retryable, or that outlives the retry budget, is returned.
    pub async fn fetch<S: ActionSource>(
        &self,
        source: &S,
        ids: &[ActionId],
    ) -> Result<Vec<Action>, ApiError> {
        let mut snapshots = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            snapshots.extend(self.fetch_chunk(source, chunk).await?);
        }
        Ok(snapshots)
    }

    async fn fetch_chunk<S: ActionSource>(
        &self,
        source: &S,
        ids: &[ActionId],
    ) -> Result<Vec<Action>, ApiError> {
        let mut attempt = 0;
        loop {
            match source.fetch_actions(ids).await {
                Ok(actions) => {
                    debug!(requested = ids.len(), received = actions.len(), "fetched action status");
                    return Ok(actions);
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let mut delay = self.retry.delay_for_attempt(attempt);
                    if let Some(ms) = err.retry_after_ms() {
                        delay = delay.max(Duration::from_millis(ms));
                    }
                    warn!(
                        attempt,
                        max = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "status fetch failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
