//! Bounded retry with exponential backoff for transient store failures.

use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::store::{StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.store_retry_attempts.max(1),
            initial_backoff: Duration::from_millis(config.store_retry_backoff_ms),
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt + 1` (0-indexed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }

    /// Run `op`, retrying transient [`StoreError`]s. Other errors, and the
    /// error from the final attempt, are returned as-is.
    pub async fn run<T, F, Fut>(&self, name: &'static str, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < self.max_attempts => {
                    let backoff = self.backoff_for_attempt(attempt);
                    tracing::warn!(
                        op = name,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient store failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(log_final(name, attempt + 1, err)),
            }
        }
    }
}

fn log_final(name: &'static str, attempts: u32, err: StoreError) -> StoreError {
    tracing::error!(op = name, attempts, error = %err, "store operation failed");
    err
}
