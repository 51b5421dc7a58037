//! Timeout utilities
//!
//! Provides timeout wrappers for operations that might hang. The engine
//! passes the configured `resolver.commit_timeout_ms` to
//! `with_custom_timeout()`.

use std::time::Duration;
use tokio::time::timeout;

/// Execute operation with custom timeout
pub async fn with_custom_timeout<F, T>(
    operation: F,
    duration: Duration,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    timeout(duration, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_custom_timeout_elapses() {
        let result = with_custom_timeout(
            tokio::time::sleep(Duration::from_millis(200)),
            Duration::from_millis(5),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_custom_timeout_passes_value_through() {
        let value = with_custom_timeout(async { 7 }, Duration::from_secs(1)).await;
        assert_eq!(value.unwrap(), 7);
    }
}
