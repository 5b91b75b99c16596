// src/ingest/retry.rs
use std::future::Future;
use std::time::Duration;

use metrics::counter;

use crate::ingest::error::ClientError;

/// Bounded attempts with exponential backoff (`base << (attempt - 1)`, capped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Last error seen once the attempt budget ran out, or the first
/// non-retryable one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: ClientError,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Sleep before attempt `attempt + 1`, given `attempt` (1-based) just failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < max => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        target: "ingest",
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying remote call"
                    );
                    counter!("snapshot_fetch_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(RetryFailure {
                        attempts: attempt,
                        error: e,
                    })
                }
            }
        }
    }
}
