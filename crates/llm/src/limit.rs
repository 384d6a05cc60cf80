//! Concurrency cap shared by every caller of one client.

use std::sync::Arc;

use async_trait::async_trait;
use buddy_common::{BuddyError, Result};
use tokio::sync::Semaphore;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

/// Lets at most `max_concurrent` completions through at once; the rest wait
/// for a permit.
pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    permits: Semaphore,
}

impl SemaphoredClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| BuddyError::UpstreamUnavailable("llm permit pool closed".into()))?;
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct SlowLlm {
        in_flight: AtomicU32,
        peak: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for SlowLlm {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(40)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(LlmResponse {
                content: "ok".into(),
                model: "slow".into(),
                usage: None,
                finish_reason: None,
            })
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_peak_concurrency_is_capped() {
        let slow = Arc::new(SlowLlm::default());
        let limited = Arc::new(SemaphoredClient::new(slow.clone(), 2));

        let calls: Vec<_> = (0..6)
            .map(|_| {
                let client = limited.clone();
                tokio::spawn(async move { client.complete(LlmRequest::default()).await })
            })
            .collect();
        for call in calls {
            call.await.unwrap().unwrap();
        }

        assert!(slow.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(limited.available_permits(), 2);
    }

    #[test]
    fn test_zero_limit_still_admits_one() {
        let limited = SemaphoredClient::new(Arc::new(SlowLlm::default()), 0);
        assert_eq!(limited.available_permits(), 1);
        assert_eq!(limited.model_name(), "slow");
    }
}
