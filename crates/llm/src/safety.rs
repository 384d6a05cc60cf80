//! Local, offline content checks applied to user text before generation.

use std::sync::LazyLock;

use async_trait::async_trait;
use buddy_common::{BuddyError, Result};
use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

const MAX_PROMPT_CHARS: usize = 50_000;

/// Keyword lists per category, with the severity a hit carries.
const DISALLOWED: &[(&str, u8, &[&str])] = &[
    ("self_harm", 5, &["suicide", "kill myself", "self-harm"]),
    (
        "illegal",
        5,
        &[
            "how to make a bomb",
            "explosive",
            "drug lab",
            "hack into",
            "carding",
            "steal credentials",
        ],
    ),
    ("violence", 4, &["murder", "assassinat", "torture"]),
    ("hate", 4, &["kill all", "hate speech"]),
    ("sexual", 3, &["porn", "rape", "incest", "bestiality"]),
];

static PII_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("credit_card", r"\b(?:4[0-9]{12}(?:[0-9]{3})?|5[1-5][0-9]{14})\b"),
        ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
    ]
    .into_iter()
    .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (name, re)))
    .collect()
});

/// Outcome of [`moderate`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Moderation {
    pub allowed: bool,
    pub reasons: Vec<String>,
    /// Highest-severity category hit, if any.
    pub category: Option<&'static str>,
    pub severity: u8,
}

/// Run the keyword, PII and length checks over `text`.
pub fn moderate(text: &str) -> Moderation {
    let lower = text.to_lowercase();
    let mut result = Moderation::default();

    if text.chars().count() > MAX_PROMPT_CHARS {
        result.reasons.push("prompt_too_long".to_string());
        result.severity = result.severity.max(1);
    }

    for (name, re) in PII_PATTERNS.iter() {
        if re.is_match(text) {
            result.reasons.push(format!("pii_detected:{name}"));
            if result.severity < 3 {
                result.severity = 3;
                result.category = Some("pii");
            }
        }
    }

    for (category, severity, keywords) in DISALLOWED {
        for kw in keywords.iter().filter(|kw| lower.contains(*kw)) {
            result.reasons.push(format!("disallowed_keyword:{category}:{kw}"));
            if *severity > result.severity {
                result.severity = *severity;
                result.category = Some(*category);
            }
        }
    }

    result.allowed = result.reasons.is_empty();
    result
}

/// Refuses to forward requests whose latest user message fails [`moderate`].
///
/// A block surfaces as `UpstreamUnavailable`, so agents answer with their
/// usual degraded reply instead of generating.
pub struct ModeratedClient<T: LlmClient> {
    inner: T,
}

impl<T: LlmClient> ModeratedClient<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: LlmClient> LlmClient for ModeratedClient<T> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        if let Some(text) = request.last_user_message() {
            let verdict = moderate(text);
            if !verdict.allowed {
                info!(
                    category = verdict.category.unwrap_or("other"),
                    severity = verdict.severity,
                    reasons = ?verdict.reasons,
                    "Generation blocked by moderation"
                );
                return Err(BuddyError::UpstreamUnavailable(format!(
                    "blocked by moderation: {}",
                    verdict.category.unwrap_or("other")
                )));
            }
        }
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
