pub mod client;
pub mod config;
pub mod gemini;
pub mod limit;
pub mod openai;
pub mod safety;
pub mod timeout;

pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role};
pub use config::{build_llm_client, LlmConfig, Provider};
pub use gemini::GeminiClient;
pub use limit::SemaphoredClient;
pub use openai::OpenAiClient;
pub use safety::{moderate, ModeratedClient, Moderation};
pub use timeout::TimeoutClient;

pub use buddy_common::TokenUsage;
