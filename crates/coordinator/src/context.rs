//! The runtime context: every long-lived component of a Smart Buddy process,
//! built once from [`BuddyConfig`] and shared by reference.

use std::sync::Arc;

use buddy_agents::{AgentSet, ToolRegistry};
use buddy_common::Result;
use buddy_llm::{build_llm_client, LlmClient};
use buddy_memory::{build_embedder, MemoryRetriever, MemoryStore, SessionHistory};
use buddy_observability::ObservabilitySink;
use tracing::info;

use crate::config::BuddyConfig;

pub struct BuddyContext {
    pub config: BuddyConfig,
    pub llm: Arc<dyn LlmClient>,
    pub store: Arc<MemoryStore>,
    pub history: Arc<SessionHistory>,
    pub retriever: MemoryRetriever,
    pub tools: Arc<ToolRegistry>,
    pub agents: AgentSet,
    pub sink: Arc<ObservabilitySink>,
}

impl BuddyContext {
    /// Build the LLM client from `config.llm`, then everything else.
    pub async fn from_config(config: &BuddyConfig) -> Result<Self> {
        let llm = build_llm_client(&config.llm)?;
        Self::with_llm(config, llm).await
    }

    /// Same as [`from_config`](Self::from_config) with a caller-supplied LLM
    /// client. Tests use this to inject scripted models.
    pub async fn with_llm(config: &BuddyConfig, llm: Arc<dyn LlmClient>) -> Result<Self> {
        let embedder = build_embedder(&config.memory)?;
        let store = Arc::new(MemoryStore::open(&config.memory, embedder).await?);
        let history = Arc::new(SessionHistory::new(config.memory.history_capacity));
        let retriever = MemoryRetriever::new(store.clone(), history.clone(), &config.memory);

        let tools = Arc::new(
            ToolRegistry::with_builtins(store.clone(), config.tools.docs_root.clone())
                .with_files_root(config.tools.files_root.clone()),
        );
        let agents = AgentSet::new(llm.clone(), tools.clone());
        let sink = Arc::new(ObservabilitySink::new(&config.observability));

        info!(
            model = llm.model_name(),
            tools = ?tools.names(),
            persistent = config.memory.db_path.is_some(),
            "Buddy context ready"
        );

        Ok(Self {
            config: config.clone(),
            llm,
            store,
            history,
            retriever,
            tools,
            agents,
            sink,
        })
    }

    /// Log final counters. Records are written through on every mutation,
    /// so nothing is left to flush.
    pub async fn shutdown(&self) {
        let snapshot = self.sink.snapshot();
        let stats = self.store.stats().await;
        info!(
            total_requests = snapshot.total_requests,
            errors_total = snapshot.errors_total,
            degraded_replies = snapshot.degraded_replies,
            users = stats.users,
            records = stats.records,
            "Buddy context shut down"
        );
    }
}
