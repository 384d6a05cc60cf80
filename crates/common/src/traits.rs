//! The mode-agent contract and the values that flow across it.
//!
//! These live in `buddy-common` so that the coordinator and the agents crate
//! can both reference them without a dependency cycle.

use crate::{Envelope, HistoryTurn, MemoryRecord, Mode, Namespace, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Token counts reported by the LLM provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// A semantic-search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// `<namespace>/<key>` or `snippet/<uuid>`
    pub source_ref: String,

    pub text: String,

    pub score: f32,
}

/// Persistence intent emitted by an agent, applied by the router after the
/// reply is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideEffect {
    Upsert {
        namespace: Namespace,
        key: String,
        value: serde_json::Value,
    },
    Delete {
        namespace: Namespace,
        key: String,
    },
    /// Index free text for later similarity search.
    Remember { text: String },
    ToolCall {
        tool: String,
        action: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
}

impl SideEffect {
    pub fn kind(&self) -> &'static str {
        match self {
            SideEffect::Upsert { .. } => "upsert",
            SideEffect::Delete { .. } => "delete",
            SideEffect::Remember { .. } => "remember",
            SideEffect::ToolCall { .. } => "tool_call",
        }
    }
}

/// What a mode agent produced for one turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentReply {
    pub reply: String,

    #[serde(default)]
    pub side_effects: Vec<SideEffect>,

    #[serde(default)]
    pub tokens: TokenUsage,

    /// Set when the reply is a canned fallback because the LLM failed.
    #[serde(default)]
    pub degraded: bool,

    /// Non-fatal post-processing notes (e.g. persona style checks).
    #[serde(default)]
    pub advisories: Vec<String>,
}

impl AgentReply {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            ..Default::default()
        }
    }

    pub fn degraded(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            degraded: true,
            ..Default::default()
        }
    }

    pub fn with_side_effect(mut self, effect: SideEffect) -> Self {
        self.side_effects.push(effect);
        self
    }
}

/// Short- and long-term context assembled for one agent call.
#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    /// Most similar indexed snippets for this user, best first.
    pub snippets: Vec<SearchHit>,

    /// Recent session turns, oldest first.
    pub history: Vec<HistoryTurn>,

    /// Records from the agent's read namespaces, in insertion order.
    pub records: Vec<MemoryRecord>,
}

impl MemoryContext {
    pub fn records_in(&self, namespace: Namespace) -> impl Iterator<Item = &MemoryRecord> {
        self.records.iter().filter(move |r| r.namespace == namespace)
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty() && self.history.is_empty() && self.records.is_empty()
    }
}

/// A persona that answers one turn.
#[async_trait]
pub trait ModeAgent: Send + Sync {
    fn mode(&self) -> Mode;

    /// Namespaces whose records are loaded into [`MemoryContext::records`].
    fn read_namespaces(&self) -> &'static [Namespace];

    fn system_prompt(&self) -> &str;

    /// Produce a reply. LLM failures must degrade into a canned reply
    /// rather than an error; an `Err` means something unexpected broke.
    async fn handle(&self, envelope: &Envelope, context: &MemoryContext) -> Result<AgentReply>;
}
