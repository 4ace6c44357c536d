use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::pass::PassTarget;

/// Exponential backoff for transient model-provider failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    /// Run one model call for `chunk`, backing off and calling again while
    /// it fails. The last error is returned once the retries are spent.
    pub async fn run<F, Fut, T, E>(&self, chunk: usize, target: PassTarget, mut call: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut backoff = self.initial_backoff;
        let mut failures = 0;

        loop {
            let err = match call().await {
                Ok(value) => {
                    if failures > 0 {
                        debug!(chunk, ?target, failures, "Model call recovered");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if failures == self.max_retries {
                return Err(err);
            }
            failures += 1;

            warn!(
                chunk,
                ?target,
                failures,
                max_retries = self.max_retries,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Model call failed, backing off"
            );
            sleep(backoff).await;
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_after_max_retries() {
        let policy = RetryPolicy::new(2, 0, 0);
        let mut calls = 0;

        let result: Result<(), String> = policy
            .run(0, PassTarget::All, || {
                calls += 1;
                async { Err("connection refused".to_string()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn returns_first_success() {
        let policy = RetryPolicy::new(3, 0, 0);
        let mut calls = 0;

        let result: Result<usize, String> = policy
            .run(0, PassTarget::All, || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 2 {
                        Err("timeout".to_string())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let policy = RetryPolicy::new(0, 0, 0);
        let mut calls = 0;

        let _: Result<(), String> = policy
            .run(0, PassTarget::All, || {
                calls += 1;
                async { Err("down".to_string()) }
            })
            .await;

        assert_eq!(calls, 1);
    }
}
