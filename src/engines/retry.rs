use std::future::Future;
use std::time::Duration;

use crate::PipelineResult;

/// Bounded retry policy for transient failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retry_count: u32) -> Self {
        Self {
            max_attempts: retry_count.max(1),
            base_delay: Duration::from_millis(200),
        }
    }

    /// Policy that never retries, for callers that want a single attempt
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(0),
        }
    }
}

/// Run `operation` with exponential backoff, retrying only retryable error
/// kinds (model inference, timeouts). Validation errors fail immediately.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut f: F,
) -> PipelineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.base_delay * 2u32.saturating_pow(attempt - 1);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Like [`with_retry`], but absorbs the final error into a degraded default.
///
/// Used where the pipeline must continue with placeholder content instead of
/// failing the job (captions, embeddings).
pub async fn with_retry_or<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    fallback: T,
    f: F,
) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    match with_retry(policy, operation, f).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(operation, error = %e, "Degrading after retry budget exhausted");
            fallback
        }
    }
}
