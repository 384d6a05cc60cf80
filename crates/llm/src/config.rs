//! `[llm]` settings and the factory that turns them into a layered client.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use buddy_common::{BuddyError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::LlmClient;
use crate::gemini::GeminiClient;
use crate::limit::SemaphoredClient;
use crate::openai::OpenAiClient;
use crate::safety::ModeratedClient;
use crate::timeout::TimeoutClient;

/// Wire protocol a configured endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// OpenAI or any server exposing `/v1/chat/completions`.
    OpenAi,
    Gemini,
}

impl FromStr for Provider {
    type Err = BuddyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            other => Err(BuddyError::Config(format!("Unknown LLM provider: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `openai` or `gemini`
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_ms: u64,
    pub max_concurrent_requests: usize,
    /// Screen user text locally before it reaches the provider.
    pub moderation: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            api_key: None,
            api_url: None,
            temperature: None,
            max_tokens: None,
            timeout_ms: 30_000,
            max_concurrent_requests: 4,
            moderation: false,
        }
    }
}

impl LlmConfig {
    pub fn provider(&self) -> Result<Provider> {
        self.provider.parse()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn provider_client(&self) -> Result<Box<dyn LlmClient>> {
        Ok(match self.provider()? {
            Provider::OpenAi => Box::new(OpenAiClient::new(
                self.api_url.clone(),
                self.model.clone(),
                self.api_key.clone(),
            )),
            Provider::Gemini => {
                let key = self
                    .api_key
                    .clone()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| BuddyError::Config("Gemini requires an API key".into()))?;
                Box::new(GeminiClient::new(self.api_url.clone(), self.model.clone(), key))
            }
        })
    }
}

/// Provider client plus its layers. From the caller inward: concurrency
/// cap, optional moderation, deadline, provider. Waiting for a permit does
/// not eat into the deadline.
pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let mut client: Box<dyn LlmClient> =
        Box::new(TimeoutClient::new(config.provider_client()?, config.timeout()));
    if config.moderation {
        client = Box::new(ModeratedClient::new(client));
    }

    info!(
        provider = %config.provider,
        model = %config.model,
        timeout_ms = config.timeout_ms,
        max_concurrent = config.max_concurrent_requests,
        moderation = config.moderation,
        "LLM client ready"
    );
    Ok(Arc::new(SemaphoredClient::new(
        Arc::from(client),
        config.max_concurrent_requests,
    )))
}
