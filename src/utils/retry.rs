//! Retry utilities
//!
//! Provides retry logic with exponential backoff for transient failures.

use std::time::Duration;
use tokio::time::sleep;

use crate::config::ResolverConfig;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Initial delay between retries (exponential backoff)
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    /// Commit retries: first attempt plus `max_retries` retries
    pub fn for_commits(config: &ResolverConfig) -> Self {
        Self {
            max_attempts: config.max_retries.saturating_add(1),
            initial_delay: config.retry_initial_delay(),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

/// Check if an error is retryable (transient failure)
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

/// Retry only if error is retryable
///
/// Non-retryable errors are returned immediately; the last retryable error
/// is returned once attempts run out.
pub async fn retry_if_retryable<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= attempts => return Err(e),
            Err(e) => {
                tracing::debug!(
                    "Retryable error (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt,
                    attempts,
                    e,
                    delay
                );
                sleep(delay).await;
                delay = std::cmp::min(
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier),
                    config.max_delay,
                );
            }
        }
    }
}
