//! Memory types and configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One vector in a user's semantic index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// `<namespace>/<key>` or `snippet/<uuid>`
    pub source_ref: String,

    pub text: String,

    pub embedding: Vec<f32>,

    /// Partition-local insertion sequence; higher is more recent.
    pub seq: i64,

    pub created_at: DateTime<Utc>,
}

impl IndexEntry {
    pub fn is_snippet(&self) -> bool {
        self.source_ref.starts_with("snippet/")
    }
}

/// Counts reported by [`crate::MemoryStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub users: usize,
    pub records: usize,
    pub index_entries: usize,
}

/// Configuration for the memory system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// SQLite file; `None` keeps everything in an in-memory database.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// `hash` (offline) or `openai` (any `/v1/embeddings` endpoint)
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default)]
    pub embedding_api_url: Option<String>,

    #[serde(default)]
    pub embedding_api_key: Option<String>,

    /// Vector length produced by the hash embedder
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Snippets returned per similarity search
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Snippets scoring below this are dropped from agent context
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Turns kept per session ring buffer
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Most recent turns included in prompts
    #[serde(default = "default_history_in_prompt")]
    pub history_in_prompt: usize,

    /// Upper bound for any single store operation
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_embedding_provider() -> String {
    "hash".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_embedding_dim() -> usize {
    256
}

fn default_top_k() -> usize {
    5
}

fn default_min_similarity() -> f32 {
    0.3
}

fn default_history_capacity() -> usize {
    100
}

fn default_history_in_prompt() -> usize {
    10
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            embedding_api_url: None,
            embedding_api_key: None,
            embedding_dim: default_embedding_dim(),
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            history_capacity: default_history_capacity(),
            history_in_prompt: default_history_in_prompt(),
            timeout_ms: default_timeout_ms(),
        }
    }
}
