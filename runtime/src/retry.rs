//! Bounded retry with exponential backoff around a single provider call.
//!
//! Every attempt runs under its own timeout and races the session's
//! cancellation token, so a superseded session stops at the next await.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::orchestrator::Stage;
use crate::provider::{AnalysisProvider, ProviderError, ProviderRequest, ProviderResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Doubles after each retry.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

pub async fn call_with_retry(
    provider: &dyn AnalysisProvider,
    request: &ProviderRequest,
    policy: &RetryPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
    stage: Stage,
) -> Result<ProviderResponse, ProviderError> {
    let mut attempt = 0u32;
    loop {
        if attempt > 0 {
            let delay = policy.backoff(attempt);
            tracing::debug!(%stage, attempt, max_retries = policy.max_retries, ?delay, "retrying provider call");
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            result = tokio::time::timeout(timeout, provider.generate(request.clone())) => {
                result.unwrap_or(Err(ProviderError::Timeout(timeout)))
            }
        };

        match outcome {
            Ok(response) => return Ok(response),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                tracing::warn!(%stage, attempt, error = %err, "transient provider failure");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
