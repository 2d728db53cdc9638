use crate::error::ApiError;
use configuration::EngineConfig;
use std::future::Future;
use std::time::Duration;

/// How often and how patiently a read is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            attempts: config.max_retries.max(1),
            delay: Duration::from_secs(config.retry_delay_secs),
        }
    }
}

/// Runs `op` until it succeeds, fails permanently or runs out of attempts.
///
/// Only [`ApiError::is_transient`] failures are retried, with the delay
/// growing linearly per attempt. Never wrap order placement in this.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                tracing::warn!(label, attempt, error = %e, "Transient API failure, retrying");
                tokio::time::sleep(policy.delay * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
