//! Bounded retry for the two external service calls.
//!
//! Only transient failures (see [`crate::AppError::is_transient`]) are retried,
//! and at most once.

use std::future::Future;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::error::AppResult;

/// Hard ceiling on retries regardless of configuration.
pub const MAX_RETRIES: u32 = 1;

/// Retry settings for one external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (clamped to `MAX_RETRIES`)
    pub max_retries: u32,

    /// Backoff before the first retry
    pub initial_backoff: Duration,

    /// Upper bound on any single backoff
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl From<&ServiceConfig> for RetryPolicy {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(config.backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (1-based), doubled per attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `operation`, retrying transient failures per this policy.
    ///
    /// Non-transient errors are returned immediately.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let retries = self.max_retries.min(MAX_RETRIES);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < retries => {
                    attempt += 1;
                    let backoff = self.backoff_for(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}), retrying in {}ms: {}",
                        label,
                        attempt,
                        retries + 1,
                        backoff.as_millis(),
                        e
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
