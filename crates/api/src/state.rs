//! Shared state for the HTTP handlers.

use std::sync::Arc;
use std::time::Instant;

use buddy_common::Result;
use buddy_coordinator::{BuddyConfig, BuddyContext, Router};

use crate::auth::ApiKey;

pub struct AppState {
    /// Turn entry point; owns the [`BuddyContext`]
    pub router: Arc<Router>,

    /// Bearer token required on everything except `/health`
    pub api_key: Option<ApiKey>,

    pub start_time: Instant,
}

impl AppState {
    pub fn new(context: BuddyContext) -> Self {
        Self {
            router: Arc::new(Router::new(Arc::new(context))),
            api_key: None,
            start_time: Instant::now(),
        }
    }

    pub async fn from_config(config: &BuddyConfig) -> Result<Self> {
        Ok(Self::new(BuddyContext::from_config(config).await?))
    }

    pub fn with_api_key(mut self, key: ApiKey) -> Self {
        self.api_key = Some(key);
        self
    }

    pub fn context(&self) -> &BuddyContext {
        self.router.context()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
