//! Bounded retry for the outbound provider calls.

use std::future::Future;
use std::time::Duration;

/// How often a provider request is attempted and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Pause before each retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    /// One retry after 250ms.
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Run `operation`, retrying only on transient transport failures (connect errors and
    /// timeouts). HTTP status codes are never retried here; they arrive as `Ok` responses.
    pub async fn execute<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T, reqwest::Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, reqwest::Error>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !is_transient(&e) || attempt >= max_attempts {
                        return Err(e);
                    }
                    log::warn!(
                        "{}: attempt {}/{} failed ({}), retrying",
                        label,
                        attempt,
                        max_attempts,
                        e
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}
