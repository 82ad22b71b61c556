//! Retry wrapper for provider calls
//!
//! Exponential backoff, but only for errors the adapter tagged retryable
//! (rate limits, 5xx). Exhausting the budget surfaces the final error
//! unchanged. Retries are local to one AI operation and invisible at the
//! instruction-stack level.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::provider::ProviderError;

/// Retry policy for one AI operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    pub max_retries: u32,
    /// First backoff delay; doubles per retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Run `op` until it succeeds, fails fatally, or exhausts the budget
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable && attempt < policy.max_retries => {
                let delay = policy.base_delay * 2u32.saturating_pow(attempt);
                warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "retryable provider error: {}",
                    err.message
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
