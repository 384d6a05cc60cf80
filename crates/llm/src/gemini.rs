use async_trait::async_trait;
use buddy_common::{BuddyError, Result, TokenUsage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{LlmClient, LlmRequest, LlmResponse, Role};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

/// Client for the Google Generative Language `generateContent` API.
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(base_url: Option<String>, model: String, api_key: String) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            http_client: reqwest::Client::new(),
        }
    }

    fn build_body(request: &LlmRequest) -> GeminiRequest {
        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| GeminiContent {
                role: Some(
                    match m.role {
                        Role::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        // Gemini has no system role inside `contents`; fold any into the
        // system instruction alongside the explicit prompt.
        let system_text: Vec<&str> = request
            .system_prompt
            .as_deref()
            .into_iter()
            .chain(
                request
                    .messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.content.as_str()),
            )
            .collect();

        let system_instruction = (!system_text.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: system_text.join("\n\n"),
            }],
        });

        let generation_config = (request.temperature.is_some() || request.max_tokens.is_some())
            .then(|| GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            });

        GeminiRequest {
            contents,
            system_instruction,
            generation_config,
        }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = Self::build_body(&request);

        debug!(model = %self.model, contents = body.contents.len(), "Sending generateContent");

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BuddyError::UpstreamUnavailable(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(BuddyError::UpstreamUnavailable(format!(
                "Gemini API error {status}: {body_text}"
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            BuddyError::UpstreamUnavailable(format!("Failed to parse Gemini response: {e}"))
        })?;

        let candidate = gemini_response.candidates.into_iter().next().ok_or_else(|| {
            BuddyError::UpstreamUnavailable("No candidates in Gemini response".to_string())
        })?;

        let content = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if content.is_empty() {
            return Err(BuddyError::UpstreamUnavailable(format!(
                "Gemini returned no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(LlmResponse {
            content,
            model: gemini_response
                .model_version
                .unwrap_or_else(|| self.model.clone()),
            usage: gemini_response.usage_metadata.map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
            }),
            finish_reason: candidate.finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatMessage;

    #[test]
    fn request_body_maps_roles() {
        let request = LlmRequest {
            system_prompt: Some("Be kind.".to_string()),
            messages: vec![
                ChatMessage::user("Hi"),
                ChatMessage::assistant("Hello!"),
                ChatMessage::user("How are you?"),
            ],
            temperature: Some(0.2),
            max_tokens: Some(256),
        };

        let json = serde_json::to_value(GeminiClient::build_body(&request)).unwrap();

        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "How are you?");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be kind.");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn request_body_omits_empty_sections() {
        let json =
            serde_json::to_value(GeminiClient::build_body(&LlmRequest::prompt(None, "Hi"))).unwrap();
        assert!(json.get("systemInstruction").is_none());
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn response_parses_usage_metadata() {
        let json = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hey"}, {"text": " there"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 3},
            "modelVersion": "gemini-2.5-flash"
        }"#;
        let parsed: GeminiResponse = serde_json::from_str(json).unwrap();
        let usage = parsed.usage_metadata.unwrap();
        assert_eq!(usage.prompt_token_count, 7);
        assert_eq!(usage.candidates_token_count, 3);
        let parts = &parsed.candidates[0].content.as_ref().unwrap().parts;
        assert_eq!(parts.len(), 2);
    }
}
