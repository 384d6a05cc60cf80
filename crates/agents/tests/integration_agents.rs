//! Agents working against a real memory store and tool registry.
//!
//! Side effects are applied here the same way the router applies them, so a
//! reply's effects can be observed on the next turn's context.

use async_trait::async_trait;
use buddy_agents::{AgentSet, ToolRegistry, ToolRequest};
use buddy_common::{BuddyError, Envelope, Mode, ModeAgent, Namespace, Result, SideEffect};
use buddy_llm::{LlmClient, LlmRequest, LlmResponse};
use buddy_memory::{MemoryConfig, MemoryRetriever, MemoryStore, SessionHistory};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replies with queued completions, then fails once the queue is empty.
struct QueueLlm {
    replies: Mutex<VecDeque<&'static str>>,
}

impl QueueLlm {
    fn new(replies: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().copied().collect()),
        })
    }
}

#[async_trait]
impl LlmClient for QueueLlm {
    async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
        let next = self.replies.lock().unwrap().pop_front();
        next.map(|content| LlmResponse {
            content: content.to_string(),
            model: "queue".into(),
            usage: None,
            finish_reason: None,
        })
        .ok_or_else(|| BuddyError::UpstreamUnavailable("queue exhausted".into()))
    }

    fn model_name(&self) -> &str {
        "queue"
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    retriever: MemoryRetriever,
    tools: Arc<ToolRegistry>,
    agents: AgentSet,
}

impl Harness {
    async fn new(llm: Arc<dyn LlmClient>) -> Self {
        let config = MemoryConfig::default();
        let store = Arc::new(MemoryStore::in_memory().await.unwrap());
        let history = Arc::new(SessionHistory::new(config.history_capacity));
        let tools = Arc::new(ToolRegistry::with_builtins(store.clone(), None));
        Self {
            retriever: MemoryRetriever::new(store.clone(), history, &config),
            agents: AgentSet::new(llm, tools.clone()),
            tools,
            store,
        }
    }

    async fn turn(&self, mode: Mode, text: &str) -> buddy_common::AgentReply {
        let envelope = Envelope::new("u1", "s1", text, None).unwrap();
        let agent = self.agents.get(mode);
        let context = self
            .retriever
            .build_context("u1", "s1", text, agent.read_namespaces())
            .await
            .unwrap();
        let reply = agent.handle(&envelope, &context).await.unwrap();
        for effect in &reply.side_effects {
            match effect {
                SideEffect::Upsert { namespace, key, value } => {
                    self.store.upsert(*namespace, "u1", key, value.clone()).await.unwrap();
                }
                SideEffect::Delete { namespace, key } => {
                    self.store.delete(*namespace, "u1", key).await.unwrap();
                }
                SideEffect::Remember { text } => {
                    self.store.remember("u1", text).await.unwrap();
                }
                SideEffect::ToolCall { tool, action, arguments } => {
                    let request = ToolRequest::new("u1", &envelope.trace_id, action, arguments.clone());
                    self.tools.call(tool, request).await.unwrap();
                }
            }
        }
        reply
    }
}

#[tokio::test]
async fn test_created_task_shows_up_in_list() {
    let llm = QueueLlm::new(&[
        r#"Done! TASK_CREATED: {"text": "finish report", "deadline": "tomorrow"}"#,
    ]);
    let h = Harness::new(llm).await;

    let created = h.turn(Mode::General, "Add task to finish report tomorrow").await;
    assert_eq!(created.reply, "✅ Added: finish report - Due: tomorrow");

    let listed = h.turn(Mode::General, "show my tasks").await;
    assert_eq!(listed.reply, "📝 Your todo list:\n\n1. finish report (due tomorrow)");
}

#[tokio::test]
async fn test_saved_plan_round_trip() {
    let llm = QueueLlm::new(&["1. Learn the basics\n2. Build a project"]);
    let h = Harness::new(llm).await;

    let plan = h.turn(Mode::Mentor, "Give me a roadmap to learn Rust").await;
    // "learn" selects teaching before planning
    assert!(plan.reply.starts_with("📚"));

    let llm = QueueLlm::new(&["1. Week one: basics\n2. Week two: project"]);
    let h = Harness::new(llm).await;
    h.turn(Mode::Mentor, "Create a roadmap for my half marathon").await;
    let shown = h.turn(Mode::Mentor, "show my plan").await;
    assert!(shown.reply.starts_with("📋 **Saved Plan: Create a roadmap for my half marathon**"));
    assert!(shown.reply.contains("Week two"));
}

#[tokio::test]
async fn test_tool_call_marker_reaches_kv_tool() {
    let llm = QueueLlm::new(&[
        r#"Saved your timezone.
TOOL_CALL: {"tool": "kv", "action": "set", "arguments": {"key": "timezone", "value": "Europe/Berlin"}}"#,
    ]);
    let h = Harness::new(llm).await;
    let reply = h.turn(Mode::General, "I live in Berlin").await;
    assert_eq!(reply.reply, "Saved your timezone.");

    let record = h.store.get(Namespace::Generic, "u1", "timezone").await.unwrap();
    assert_eq!(record.value, "Europe/Berlin");
}

#[tokio::test]
async fn test_remembered_fact_feeds_next_prompt() {
    let llm = QueueLlm::new(&["Noted!", "It's blue!"]);
    let h = Harness::new(llm).await;
    h.turn(Mode::BestFriend, "my favorite color is blue").await;

    let hits = h.store.semantic_search("u1", "favorite color", 5).await.unwrap();
    assert!(hits.iter().any(|hit| hit.text == "my favorite color is blue"));
}
