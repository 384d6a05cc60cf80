//! Memory system for Smart Buddy.
//!
//! Two layers, both scoped per user:
//!
//! - **Session history**: bounded ring buffer of recent turns, process-local.
//! - **Memory store**: namespaced records (`tasks`, `events`, `mentor_plans`,
//!   `sessions`, `generic`) plus a semantic index of record texts and
//!   remembered snippets, persisted to SQLite.
//!
//! ```text
//!   upsert / delete / remember
//!            │
//!            ▼
//!   ┌──────────────────┐   write-through   ┌─────────────────────┐
//!   │ user partitions  │ ────────────────▶ │ SQLite              │
//!   │ (DashMap + lock) │                   │  records            │
//!   │  records         │ ◀──── load ────── │  semantic_index     │
//!   │  index entries   │                   └─────────────────────┘
//!   └──────────────────┘
//!            │ cosine similarity
//!            ▼
//!      MemoryRetriever ──▶ MemoryContext for the agent
//! ```

pub mod embedding;
pub mod history;
pub mod retrieval;
pub mod sqlite;
pub mod store;
pub mod types;

pub use embedding::{build_embedder, cosine_similarity, Embedder, HashEmbedder, HttpEmbedder};
pub use history::SessionHistory;
pub use retrieval::MemoryRetriever;
pub use store::MemoryStore;
pub use types::{IndexEntry, MemoryConfig, StoreStats};
