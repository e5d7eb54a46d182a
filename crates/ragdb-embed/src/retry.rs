//! One bounded retry loop shared by every HTTP adapter.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use ragdb_core::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Single attempt; the first error is surfaced.
    pub const fn none() -> Self {
        Self { max_attempts: 1, initial_backoff: Duration::ZERO, multiplier: 1 }
    }

    /// Three attempts, 1s then 2s between them.
    pub const fn exponential() -> Self {
        Self { max_attempts: 3, initial_backoff: Duration::from_secs(1), multiplier: 2 }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Backoff slept after failed attempt `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts && e.is_retryable() => {
                    let backoff = self.backoff_for(attempt);
                    warn!(target: "ragdb::retry", label, attempt, backoff = ?backoff, error = %e, "retrying upstream call");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
