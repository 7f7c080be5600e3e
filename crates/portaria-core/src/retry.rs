//! Retry and timeout utilities
//!
//! Bounded retry with exponential backoff for operations that fail with
//! recoverable errors, plus a timeout wrapper that converts deadline misses
//! into [`Error::OperationTimeout`]. Recoverability is decided by
//! [`Error::is_recoverable`].

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure
    pub backoff_multiplier: f64,
    /// Whether to add random jitter to delays
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Configuration for quick retries of transient signaling operations
    pub fn quick() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            use_jitter: true,
        }
    }

    /// Configuration for routing remote audio into a sink that may mount
    /// after call setup.
    ///
    /// Fixed 100 ms spacing for up to 50 attempts (a 5 second window), no
    /// backoff and no jitter: the operation is local and cheap, the only
    /// thing being waited on is the UI.
    pub fn media_attach() -> Self {
        Self {
            max_attempts: 50,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(100),
            backoff_multiplier: 1.0,
            use_jitter: false,
        }
    }
}

/// Retry an operation with exponential backoff.
///
/// Retries while the error is recoverable and attempts remain;
/// non-recoverable errors return immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "operation succeeded after retries"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_recoverable() && attempt < config.max_attempts => {
                debug!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %e,
                    category = e.category(),
                    next_delay_ms = delay.as_millis() as u64,
                    "recoverable error, will retry"
                );

                let actual_delay = if config.use_jitter {
                    // +/- 10% jitter
                    let jitter = (rand::random::<f64>() - 0.5) * 0.2;
                    let millis = delay.as_millis() as f64;
                    Duration::from_millis((millis * (1.0 + jitter)) as u64)
                } else {
                    delay
                };

                sleep(actual_delay).await;

                let next_delay_ms = (delay.as_millis() as f64 * config.backoff_multiplier) as u64;
                delay = Duration::from_millis(next_delay_ms).min(config.max_delay);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "operation failed after all retry attempts"
                    );
                } else {
                    warn!(
                        operation = operation_name,
                        error = %e,
                        category = e.category(),
                        "non-recoverable error, not retrying"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Run a future with a deadline, mapping expiry to [`Error::OperationTimeout`]
pub async fn with_timeout<T, F>(operation_name: &str, timeout: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                operation = operation_name,
                timeout_ms = timeout.as_millis() as u64,
                "operation timed out"
            );
            Err(Error::OperationTimeout {
                duration_ms: timeout.as_millis() as u64,
            })
        }
    }
}
