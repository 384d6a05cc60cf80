//! Intent classification: one LLM call, with a keyword classifier for when
//! the LLM is unavailable.

use std::sync::Arc;

use buddy_common::{HistoryTurn, Result};
use buddy_llm::{LlmClient, LlmRequest};
use tracing::{debug, info};

use crate::routing::{Classification, IntentCategory};

const MAX_HISTORY_LINES: usize = 4;

/// Classifies a message with a single deterministic LLM call.
///
/// No retries: transport failures surface as `UpstreamUnavailable` and the
/// caller decides how to degrade.
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Deterministic prompt: category list, optional recent history, text.
    pub fn build_prompt(text: &str, history: &[HistoryTurn]) -> String {
        let categories = IntentCategory::ALL
            .iter()
            .map(IntentCategory::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        let mut prompt = format!(
            "Classify the user's message into exactly one category.\n\nCategories: {categories}\n"
        );
        let recent: Vec<_> = history
            .iter()
            .rev()
            .take(MAX_HISTORY_LINES)
            .rev()
            .map(HistoryTurn::as_prompt_line)
            .collect();
        if !recent.is_empty() {
            prompt.push_str(&format!("\nRecent conversation:\n{}\n", recent.join("\n")));
        }
        prompt.push_str(&format!(
            "\nMessage: \"{text}\"\n\nAnswer with the category name only."
        ));
        prompt
    }

    pub async fn classify(&self, text: &str, history: &[HistoryTurn]) -> Result<Classification> {
        let request = LlmRequest::prompt(None, Self::build_prompt(text, history))
            .with_temperature(0.0)
            .with_max_tokens(10);
        let response = self.llm.complete(request).await?;

        let classification = match parse_category(&response.content) {
            Some(category) => Classification::parsed(category),
            None => {
                debug!(response = %response.content, "Unparseable classifier output");
                Classification::fallback(IntentCategory::Unknown)
            }
        };
        info!(
            category = %classification.category,
            confidence = classification.confidence,
            "Intent classified"
        );
        Ok(classification)
    }
}

/// First known category token in `response`.
///
/// Case, hyphens and spaces are normalised, so `Problem-Solving` and
/// `emotional support` both match.
pub fn parse_category(response: &str) -> Option<IntentCategory> {
    let normalised = response.to_lowercase().replace('-', " ");
    let tokens: Vec<&str> = normalised
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .collect();

    tokens.iter().enumerate().find_map(|(i, token)| {
        let pair = tokens
            .get(i + 1)
            .and_then(|next| IntentCategory::from_token(&format!("{token}_{next}")));
        pair.or_else(|| IntentCategory::from_token(token))
    })
}

/// Offline rule-based classifier. Every result carries the fallback
/// confidence.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    const RULES: [(IntentCategory, &'static [&'static str]); 9] = [
        (
            IntentCategory::Schedule,
            &["schedule", "calendar", "appointment", "meeting", "event", "remind me", "reminder"],
        ),
        (IntentCategory::Task, &["task", "todo", "to-do", "need to do"]),
        (
            IntentCategory::EmotionalSupport,
            &["sad", "stress", "anxious", "anxiety", "feel", "upset", "depress", "lonely", "happy", "excited", "bestie"],
        ),
        (IntentCategory::Summary, &["summary", "summarize", "summarise", "tl;dr"]),
        (IntentCategory::Teaching, &["teach", "explain", "learn", "how does", "concept"]),
        (IntentCategory::Planning, &["plan", "roadmap", "steps to", "how to"]),
        (IntentCategory::Advice, &["advice", "suggest", "recommend", "should i"]),
        (IntentCategory::Review, &["review", "feedback", "critique"]),
        (IntentCategory::ProblemSolving, &["problem", "stuck", "confused", "issue", "debug"]),
    ];

    const QUESTION_WORDS: [&'static str; 7] = ["what", "who", "when", "where", "why", "how", "which"];

    pub fn classify(&self, text: &str) -> Classification {
        let lower = text.to_lowercase();
        let category = Self::RULES
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(category, _)| *category)
            .unwrap_or_else(|| {
                let first = lower.split_whitespace().next().unwrap_or_default();
                if lower.trim_end().ends_with('?') || Self::QUESTION_WORDS.contains(&first) {
                    IntentCategory::Question
                } else {
                    IntentCategory::Unknown
                }
            });
        Classification::fallback(category)
    }
}
