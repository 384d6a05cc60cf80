//! OpenAI-compatible chat completions (`/v1/chat/completions`). Works with
//! OpenAI itself and with local servers that speak the same protocol.

use async_trait::async_trait;
use buddy_common::{BuddyError, Result, TokenUsage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{LlmClient, LlmRequest, LlmResponse, Role};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Wire body, borrowing from the [`LlmRequest`].
#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionReply {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<Usage> for TokenUsage {
    fn from(u: Usage) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn upstream(what: &str, detail: impl std::fmt::Display) -> BuddyError {
    BuddyError::UpstreamUnavailable(format!("openai {what}: {detail}"))
}

pub struct OpenAiClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl OpenAiClient {
    /// `base_url` defaults to the public OpenAI API; a trailing slash is
    /// ignored.
    pub fn new(base_url: Option<String>, model: String, api_key: Option<String>) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            endpoint: format!("{}{COMPLETIONS_PATH}", base.trim_end_matches('/')),
            model,
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn body<'a>(&'a self, request: &'a LlmRequest) -> CompletionBody<'a> {
        let system = request.system_prompt.as_deref().map(|content| WireMessage {
            role: "system",
            content,
        });
        let turns = request.messages.iter().map(|m| WireMessage {
            role: wire_role(m.role),
            content: &m.content,
        });

        CompletionBody {
            model: &self.model,
            messages: system.into_iter().chain(turns).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let body = self.body(&request);
        debug!(model = %self.model, messages = body.messages.len(), "Sending chat completion");

        let mut call = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        let response = call.send().await.map_err(|e| upstream("request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(upstream(&format!("status {status}"), detail));
        }

        let reply: CompletionReply = response
            .json()
            .await
            .map_err(|e| upstream("unreadable response", e))?;
        let Some(choice) = reply.choices.into_iter().next() else {
            return Err(upstream("response", "no choices"));
        };

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            model: reply
                .model
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| self.model.clone()),
            usage: reply.usage.map(TokenUsage::from),
            finish_reason: choice.finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
