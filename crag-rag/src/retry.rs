//! Bounded retry with exponential backoff and per-attempt timeouts.

use std::future::Future;

use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{RagError, Result};

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// retry budget in `policy` is spent.
///
/// Every attempt is bounded by `policy.timeout()`. Exhausting the budget on a
/// retryable error yields [`RagError::GenerationCallError`]; non-retryable
/// errors are returned unchanged on first occurrence.
pub async fn with_retry<T, F, Fut>(operation: &str, policy: &RetryConfig, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let timeout = policy.timeout();
    let max_attempts = policy.max_retries.saturating_add(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(RagError::Timeout { operation: operation.to_string(), timeout }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                return Err(RagError::GenerationCallError {
                    operation: operation.to_string(),
                    attempts: attempt,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                let delay = policy.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "model call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
