use std::time::Duration;

use async_trait::async_trait;
use buddy_common::{BuddyError, Result};
use tracing::warn;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

/// Bounds every call to the wrapped client.
///
/// A turn never retries; an elapsed deadline surfaces immediately as
/// `UpstreamUnavailable` and the caller degrades.
pub struct TimeoutClient<T: LlmClient> {
    inner: T,
    timeout: Duration,
}

impl<T: LlmClient> TimeoutClient<T> {
    pub fn new(inner: T, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<T: LlmClient> LlmClient for TimeoutClient<T> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        match tokio::time::timeout(self.timeout, self.inner.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    model = %self.inner.model_name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "LLM call timed out"
                );
                Err(BuddyError::UpstreamUnavailable(format!(
                    "LLM call exceeded {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
