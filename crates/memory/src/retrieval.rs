//! Context assembly for mode agents.

use std::sync::Arc;

use buddy_common::{MemoryContext, Namespace, Result};
use tracing::debug;

use crate::history::SessionHistory;
use crate::store::MemoryStore;
use crate::types::MemoryConfig;

/// Merges short-term history, similar snippets and namespace records into
/// one [`MemoryContext`].
pub struct MemoryRetriever {
    store: Arc<MemoryStore>,
    history: Arc<SessionHistory>,
    top_k: usize,
    min_similarity: f32,
    history_in_prompt: usize,
}

impl MemoryRetriever {
    pub fn new(store: Arc<MemoryStore>, history: Arc<SessionHistory>, config: &MemoryConfig) -> Self {
        Self {
            store,
            history,
            top_k: config.top_k,
            min_similarity: config.min_similarity,
            history_in_prompt: config.history_in_prompt,
        }
    }

    /// Build context for one turn.
    ///
    /// Snippets below `min_similarity` are dropped. History is read before
    /// the current turn is pushed, so it never contains `query` itself.
    pub async fn build_context(
        &self,
        user_id: &str,
        session_id: &str,
        query: &str,
        namespaces: &[Namespace],
    ) -> Result<MemoryContext> {
        let history = self
            .history
            .recent(user_id, session_id, self.history_in_prompt);

        let snippets: Vec<_> = self
            .store
            .semantic_search(user_id, query, self.top_k)
            .await?
            .into_iter()
            .filter(|hit| hit.score >= self.min_similarity)
            .collect();

        let mut records = Vec::new();
        for namespace in namespaces {
            records.extend(self.store.list(*namespace, user_id).await?);
        }

        debug!(
            user_id,
            snippets = snippets.len(),
            history = history.len(),
            records = records.len(),
            "Built memory context"
        );

        Ok(MemoryContext {
            snippets,
            history,
            records,
        })
    }
}
