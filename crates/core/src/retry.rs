//! Bounded retry with a fixed delay
//!
//! Runs an attempt up to a fixed ceiling, sleeping a constant interval after
//! each failure. No backoff, no jitter: every failure is treated as transient
//! and the last error is returned once the attempts are exhausted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Retry parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one
    pub delay_ms: u64,
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay_ms: 5000,
        }
    }
}

/// A failed attempt, as seen by a [`RetryObserver`]
#[derive(Debug)]
pub struct AttemptFailure<'a> {
    pub backend: &'a str,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: &'a Error,
    /// Delay before the next attempt, `None` when this was the last one
    pub retry_in: Option<Duration>,
}

/// Receives attempt diagnostics from the retry loop
pub trait RetryObserver: Send + Sync {
    fn on_failure(&self, failure: &AttemptFailure<'_>);
}

/// Reports failed attempts through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_failure(&self, failure: &AttemptFailure<'_>) {
        match failure.retry_in {
            Some(delay) => tracing::warn!(
                backend = failure.backend,
                attempt = failure.attempt,
                max_attempts = failure.max_attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %failure.error,
                "Upload attempt failed, retrying"
            ),
            None => tracing::error!(
                backend = failure.backend,
                attempt = failure.attempt,
                max_attempts = failure.max_attempts,
                error = %failure.error,
                "Upload attempts exhausted"
            ),
        }
    }
}

/// Run `operation` until it succeeds or `config.max_attempts` is reached
///
/// The operation receives the 1-based attempt number. Attempts are strictly
/// sequential; the delay is awaited in place.
///
/// # Example
/// ```ignore
/// let url = run_with_retries(&config, &TracingObserver, "sftp", |attempt| async move {
///     upload_once(attempt).await
/// })
/// .await?;
/// ```
pub async fn run_with_retries<T, F, Fut>(
    config: &RetryConfig,
    observer: &dyn RetryObserver,
    backend: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let last = attempt >= max_attempts;
                let retry_in = (!last).then(|| config.delay());

                observer.on_failure(&AttemptFailure {
                    backend,
                    attempt,
                    max_attempts,
                    error: &e,
                    retry_in,
                });

                match retry_in {
                    None => return Err(e),
                    Some(delay) => tokio::time::sleep(delay).await,
                }
            }
        }
    }
}

/// Retry configuration builder for easy customization
#[derive(Debug, Clone)]
pub struct RetryBuilder {
    max_attempts: u32,
    delay_ms: u64,
}

impl RetryBuilder {
    pub fn new() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            delay_ms: defaults.delay_ms,
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    pub fn build(self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            delay_ms: self.delay_ms,
        }
    }
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Collects (attempt, retried) pairs
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub(crate) failures: Mutex<Vec<(u32, bool)>>,
    }

    impl RetryObserver for RecordingObserver {
        fn on_failure(&self, failure: &AttemptFailure<'_>) {
            self.failures
                .lock()
                .unwrap()
                .push((failure.attempt, failure.retry_in.is_some()));
        }
    }

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryBuilder::new().max_attempts(max_attempts).delay_ms(1).build()
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_builder() {
        let config = RetryBuilder::new().max_attempts(3).delay_ms(250).build();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.delay_ms, 250);
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let observer = RecordingObserver::default();
        let mut calls = 0;

        let result = run_with_retries(&RetryConfig::default(), &observer, "test", |_| {
            calls += 1;
            async { Ok::<_, Error>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
        assert!(observer.failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_success_on_last_attempt() {
        let observer = RecordingObserver::default();
        let seen = AtomicU32::new(0);

        let result = run_with_retries(&fast(10), &observer, "test", |attempt| {
            seen.store(attempt, Ordering::SeqCst);
            async move {
                if attempt < 10 {
                    Err(Error::Transfer(format!("attempt {attempt}")))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(seen.load(Ordering::SeqCst), 10);

        let failures = observer.failures.lock().unwrap();
        assert_eq!(failures.len(), 9);
        assert_eq!(failures.first(), Some(&(1, true)));
        assert_eq!(failures.last(), Some(&(9, true)));
    }

    #[tokio::test]
    async fn test_retry_exhausted_returns_last_error() {
        let observer = RecordingObserver::default();
        let mut calls = 0;

        let result: Result<()> = run_with_retries(&fast(10), &observer, "test", |attempt| {
            calls += 1;
            async move { Err(Error::Connection(format!("refused on {attempt}"))) }
        })
        .await;

        match result {
            Err(Error::Connection(msg)) => assert_eq!(msg, "refused on 10"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls, 10);

        let failures = observer.failures.lock().unwrap();
        assert_eq!(failures.len(), 10);
        assert_eq!(failures.last(), Some(&(10, false)));
    }

    #[tokio::test]
    async fn test_retry_zero_attempts_still_runs_once() {
        let observer = RecordingObserver::default();
        let mut calls = 0;

        let result: Result<()> = run_with_retries(&fast(0), &observer, "test", |_| {
            calls += 1;
            async { Err(Error::General("nope".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
