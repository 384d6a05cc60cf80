//! Intent categories and routing decisions.

use std::fmt;

use buddy_common::Mode;
use serde::{Deserialize, Serialize};

/// Closed set of intents the classifier may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    Task,
    Schedule,
    Question,
    EmotionalSupport,
    Teaching,
    Planning,
    Advice,
    Review,
    ProblemSolving,
    Summary,
    Unknown,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 11] = [
        IntentCategory::Task,
        IntentCategory::Schedule,
        IntentCategory::Question,
        IntentCategory::EmotionalSupport,
        IntentCategory::Teaching,
        IntentCategory::Planning,
        IntentCategory::Advice,
        IntentCategory::Review,
        IntentCategory::ProblemSolving,
        IntentCategory::Summary,
        IntentCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::Task => "task",
            IntentCategory::Schedule => "schedule",
            IntentCategory::Question => "question",
            IntentCategory::EmotionalSupport => "emotional_support",
            IntentCategory::Teaching => "teaching",
            IntentCategory::Planning => "planning",
            IntentCategory::Advice => "advice",
            IntentCategory::Review => "review",
            IntentCategory::ProblemSolving => "problem_solving",
            IntentCategory::Summary => "summary",
            IntentCategory::Unknown => "unknown",
        }
    }

    /// Exact match on the snake_case name.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == token)
    }

    pub fn to_mode(&self) -> Mode {
        match self {
            IntentCategory::Task
            | IntentCategory::Schedule
            | IntentCategory::Question
            | IntentCategory::Summary
            | IntentCategory::Unknown => Mode::General,
            IntentCategory::Teaching
            | IntentCategory::Planning
            | IntentCategory::Advice
            | IntentCategory::Review
            | IntentCategory::ProblemSolving => Mode::Mentor,
            IntentCategory::EmotionalSupport => Mode::BestFriend,
        }
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: IntentCategory,

    /// Placeholder, not calibrated: 0.9 parsed, 0.5 fallback.
    pub confidence: f32,
}

impl Classification {
    pub const PARSED_CONFIDENCE: f32 = 0.9;
    pub const FALLBACK_CONFIDENCE: f32 = 0.5;

    pub fn parsed(category: IntentCategory) -> Self {
        Self {
            category,
            confidence: Self::PARSED_CONFIDENCE,
        }
    }

    pub fn fallback(category: IntentCategory) -> Self {
        Self {
            category,
            confidence: Self::FALLBACK_CONFIDENCE,
        }
    }
}

/// How the mode for a turn was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// Caller named a valid mode
    Explicit,
    /// Caller named a mode that does not exist
    UnknownMode,
    /// LLM classifier
    Classifier,
    /// Keyword classifier after the LLM classifier failed
    KeywordFallback,
}

/// The result of routing one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    pub mode: Mode,

    /// Intent category name, or `explicit` when the caller chose the mode
    pub category: String,

    pub confidence: f32,

    pub source: RouteSource,
}

impl RouteDecision {
    pub fn explicit(mode: Mode) -> Self {
        Self {
            mode,
            category: "explicit".into(),
            confidence: 1.0,
            source: RouteSource::Explicit,
        }
    }

    pub fn unknown_mode() -> Self {
        Self {
            mode: Mode::General,
            category: IntentCategory::Unknown.as_str().into(),
            confidence: Classification::FALLBACK_CONFIDENCE,
            source: RouteSource::UnknownMode,
        }
    }

    pub fn classified(classification: Classification, source: RouteSource) -> Self {
        Self {
            mode: classification.category.to_mode(),
            category: classification.category.as_str().into(),
            confidence: classification.confidence,
            source,
        }
    }
}
