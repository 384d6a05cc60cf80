//! Prompt assembly shared by the mode agents.

use buddy_common::{BuddyError, MemoryContext, MessageRole, Result, TokenUsage};
use buddy_llm::{ChatMessage, LlmClient, LlmRequest, Role};
use tracing::debug;

/// Budget for the rendered memory section of a system prompt.
pub const DEFAULT_CONTEXT_TOKENS: usize = 1500;

/// Render snippets and records into a markdown section appended to the
/// persona prompt. Returns an empty string when there is nothing to show.
pub fn render_context(context: &MemoryContext, max_tokens: usize) -> String {
    let mut sections = Vec::new();
    let mut token_count = 0;

    let mut snippets = Vec::new();
    for hit in &context.snippets {
        let part = format!("- {}", truncate(&hit.text, 300));
        let tokens = estimate_tokens(&part);
        if token_count + tokens > max_tokens {
            break;
        }
        if !snippets.contains(&part) {
            snippets.push(part);
            token_count += tokens;
        }
    }
    if !snippets.is_empty() {
        sections.push(format!(
            "## What you remember about this user\n{}",
            snippets.join("\n")
        ));
    }

    let mut records = Vec::new();
    for record in &context.records {
        let part = format!("- {}", truncate(&record.index_text(), 300));
        let tokens = estimate_tokens(&part);
        if token_count + tokens > max_tokens {
            break;
        }
        records.push(part);
        token_count += tokens;
    }
    if !records.is_empty() {
        sections.push(format!("## Saved items\n{}", records.join("\n")));
    }

    debug!(
        snippets = snippets.len(),
        records = records.len(),
        estimated_tokens = token_count,
        "Rendered memory context"
    );

    sections.join("\n\n")
}

/// Persona prompt plus rendered context, with session history replayed as
/// chat turns ahead of `instruction`.
pub fn build_request(persona: &str, context: &MemoryContext, instruction: String) -> LlmRequest {
    let memory = render_context(context, DEFAULT_CONTEXT_TOKENS);
    let system_prompt = if memory.is_empty() {
        persona.to_string()
    } else {
        format!("{persona}\n\n{memory}")
    };

    let mut messages: Vec<ChatMessage> = context
        .history
        .iter()
        .map(|turn| ChatMessage {
            role: match turn.role {
                MessageRole::User => Role::User,
                MessageRole::Assistant => Role::Assistant,
                MessageRole::System => Role::System,
            },
            content: turn.content.clone(),
        })
        .collect();
    messages.push(ChatMessage::user(instruction));

    LlmRequest {
        system_prompt: Some(system_prompt),
        messages,
        ..Default::default()
    }
}

/// Run one completion and return the trimmed text with its token usage.
///
/// An empty completion counts as an upstream failure so callers degrade.
pub async fn ask(llm: &dyn LlmClient, request: LlmRequest) -> Result<(String, TokenUsage)> {
    let response = llm.complete(request).await?;
    let content = response.content.trim().to_string();
    if content.is_empty() {
        return Err(BuddyError::UpstreamUnavailable(format!(
            "{} returned an empty completion",
            response.model
        )));
    }
    Ok((content, response.usage.unwrap_or_default()))
}

pub fn estimate_tokens(text: &str) -> usize {
    // ~4 chars per token
    text.len().div_ceil(4)
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
