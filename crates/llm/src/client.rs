use async_trait::async_trait;
use buddy_common::{Result, TokenUsage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    /// Single user message with an optional system prompt.
    pub fn prompt(system_prompt: Option<String>, user: impl Into<String>) -> Self {
        Self {
            system_prompt,
            messages: vec![ChatMessage::user(user)],
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Content of the most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

/// A hosted text-completion collaborator.
///
/// Implementations map every transport, HTTP and decoding failure to
/// [`buddy_common::BuddyError::UpstreamUnavailable`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;
    fn model_name(&self) -> &str;
}

macro_rules! forward_llm_client {
    ($($wrapper:ident),+) => {$(
        #[async_trait]
        impl<T: LlmClient + ?Sized> LlmClient for $wrapper<T> {
            async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
                (**self).complete(request).await
            }
            fn model_name(&self) -> &str {
                (**self).model_name()
            }
        }
    )+};
}

forward_llm_client!(Box, Arc);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_request_builder() {
        let request = LlmRequest::prompt(Some("You are helpful.".to_string()), "Hi")
            .with_temperature(0.0)
            .with_max_tokens(16);
        assert_eq!(request.system_prompt.as_deref(), Some("You are helpful."));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.temperature, Some(0.0));
        assert_eq!(request.max_tokens, Some(16));
    }

    #[test]
    fn last_user_message_skips_assistant_turns() {
        let request = LlmRequest {
            messages: vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("reply"),
                ChatMessage::user("second"),
                ChatMessage::assistant("another"),
            ],
            ..Default::default()
        };
        assert_eq!(request.last_user_message(), Some("second"));
        assert_eq!(LlmRequest::default().last_user_message(), None);
    }

    #[test]
    fn llm_response_parses_usage() {
        let json = r#"{"content":"Hello there!","model":"gpt-4o-mini",
            "usage":{"prompt_tokens":10,"completion_tokens":5},"finish_reason":"stop"}"#;
        let response: LlmResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.content, "Hello there!");
        let usage = response.usage.unwrap();
        assert_eq!(usage.total(), 15);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
