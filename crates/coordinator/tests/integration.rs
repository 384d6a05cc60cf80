//! End-to-end turns through the router with a scripted LLM.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use buddy_agents::AgentSet;
use buddy_common::{
    AgentReply, BuddyError, Envelope, MemoryContext, Mode, ModeAgent, Namespace, Result,
    SessionFootprint,
};
use buddy_coordinator::{BuddyConfig, BuddyContext, ChatRequest, Router, TurnStatus, APOLOGY};
use buddy_llm::{LlmClient, LlmRequest, LlmResponse};
use buddy_observability::EventType;

type Script = Box<dyn Fn(&LlmRequest) -> Option<String> + Send + Sync>;

/// Answers classifier prompts and agent prompts separately; `None` from
/// either script means "upstream down".
struct ScriptedLlm {
    classify: Script,
    reply: Script,
    seen: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    fn new(
        classify: impl Fn(&LlmRequest) -> Option<String> + Send + Sync + 'static,
        reply: impl Fn(&LlmRequest) -> Option<String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            classify: Box::new(classify),
            reply: Box::new(reply),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn agent_requests(&self) -> Vec<LlmRequest> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !is_classifier(r))
            .cloned()
            .collect()
    }

    fn classifier_calls(&self) -> usize {
        self.seen.lock().unwrap().iter().filter(|r| is_classifier(r)).count()
    }
}

fn is_classifier(request: &LlmRequest) -> bool {
    request
        .last_user_message()
        .is_some_and(|m| m.starts_with("Classify the user's message"))
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let answer = if is_classifier(&request) {
            (self.classify)(&request)
        } else {
            (self.reply)(&request)
        };
        self.seen.lock().unwrap().push(request);
        answer
            .map(|content| LlmResponse {
                content,
                model: "scripted".into(),
                usage: None,
                finish_reason: Some("stop".into()),
            })
            .ok_or_else(|| BuddyError::UpstreamUnavailable("scripted outage".into()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

async fn router_with(llm: Arc<ScriptedLlm>) -> Router {
    let ctx = BuddyContext::with_llm(&BuddyConfig::default(), llm)
        .await
        .unwrap();
    Router::new(Arc::new(ctx))
}

fn warnings_of(router: &Router, kind: &str) -> usize {
    router
        .context()
        .sink
        .recent(1000)
        .iter()
        .filter(|e| e.event_type == EventType::Warning && e.kind.as_deref() == Some(kind))
        .count()
}

#[tokio::test]
async fn test_task_created_then_listed() {
    let llm = ScriptedLlm::new(
        |_| Some("task".into()),
        |_| Some(r#"TASK_CREATED: {"text": "finish report", "priority": "normal", "deadline": "tomorrow"}"#.into()),
    );
    let router = router_with(llm).await;

    let outcome = router
        .handle_turn(ChatRequest::new("u1", "s1", "Add task to finish report tomorrow"))
        .await
        .unwrap();
    assert_eq!(outcome.status, TurnStatus::Ok);
    assert_eq!(outcome.mode, Mode::General);
    assert_eq!(outcome.category, "task");
    assert_eq!(outcome.confidence, 0.9);
    assert!(outcome.reply.contains("finish report"));
    assert!(!outcome.reply.contains("TASK_CREATED"));

    let tasks = router.context().store.list(Namespace::Tasks, "u1").await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].value["text"], "finish report");
    assert_eq!(tasks[0].value["due"], "tomorrow");

    let listed = router
        .handle_turn(ChatRequest::new("u1", "s1", "show my todo list"))
        .await
        .unwrap();
    assert!(listed.reply.starts_with("📝 Your todo list:"));
    assert!(listed.reply.contains("finish report (due tomorrow)"));

    let routes = router
        .context()
        .sink
        .recent(100)
        .into_iter()
        .filter(|e| e.event_type == EventType::Route)
        .count();
    assert_eq!(routes, 2);
}

#[tokio::test]
async fn test_remembered_fact_stays_with_its_user() {
    let llm = ScriptedLlm::new(|_| Some("question".into()), |_| Some("Noted!".into()));
    let router = router_with(llm.clone()).await;

    router
        .handle_turn(ChatRequest::new("u1", "s1", "My favorite color is blue"))
        .await
        .unwrap();

    router
        .handle_turn(ChatRequest::new("u2", "s9", "What is my favorite color?"))
        .await
        .unwrap();
    let u2_prompt = llm.agent_requests().last().cloned().unwrap();
    assert!(!u2_prompt.system_prompt.unwrap_or_default().contains("blue"));

    router
        .handle_turn(ChatRequest::new("u1", "s2", "What is my favorite color?"))
        .await
        .unwrap();
    let u1_prompt = llm.agent_requests().last().cloned().unwrap();
    assert!(u1_prompt
        .system_prompt
        .unwrap_or_default()
        .contains("favorite color is blue"));
}

#[tokio::test]
async fn test_unknown_mode_warns_once_and_uses_general() {
    let llm = ScriptedLlm::new(|_| Some("advice".into()), |_| Some("Ahoy, here to help.".into()));
    let router = router_with(llm.clone()).await;

    let outcome = router
        .handle_turn(ChatRequest::new("u1", "s1", "hello").with_mode("pirate"))
        .await
        .unwrap();

    assert_eq!(outcome.status, TurnStatus::Ok);
    assert_eq!(outcome.mode, Mode::General);
    assert_eq!(outcome.category, "unknown");
    assert_eq!(outcome.reply, "Ahoy, here to help.");
    assert_eq!(warnings_of(&router, "unknown_mode"), 1);
    assert_eq!(llm.classifier_calls(), 0);
}

#[tokio::test]
async fn test_explicit_mode_skips_classifier() {
    let llm = ScriptedLlm::new(|_| Some("task".into()), |_| Some("omg hi 👋✨".into()));
    let router = router_with(llm.clone()).await;

    let outcome = router
        .handle_turn(ChatRequest::new("u1", "s1", "add a task").with_mode("bestfriend"))
        .await
        .unwrap();
    assert_eq!(outcome.mode, Mode::BestFriend);
    assert_eq!(outcome.category, "explicit");
    assert_eq!(outcome.confidence, 1.0);
    assert_eq!(llm.classifier_calls(), 0);
}

#[tokio::test]
async fn test_history_ring_buffer_is_bounded() {
    let llm = ScriptedLlm::new(|_| Some("unknown".into()), |_| Some("ok".into()));
    let router = router_with(llm.clone()).await;
    let capacity = router.context().history.capacity();

    for i in 0..=capacity {
        router
            .handle_turn(ChatRequest::new("u1", "s1", format!("message {i}")).with_mode("general"))
            .await
            .unwrap();
    }

    let history = &router.context().history;
    assert_eq!(history.len("u1", "s1"), capacity);
    let retained = history.recent("u1", "s1", capacity);
    assert!(retained.iter().all(|t| t.content != "message 0"));
    assert_eq!(retained.last().unwrap().content, "ok");
    assert_eq!(
        retained[retained.len() - 2].content,
        format!("message {capacity}")
    );

    router
        .handle_turn(ChatRequest::new("u1", "s1", "one more").with_mode("general"))
        .await
        .unwrap();
    let last = llm.agent_requests().pop().unwrap();
    assert!(last.messages.iter().all(|m| m.content != "message 0"));
    assert_eq!(last.last_user_message().map(|m| m.contains("one more")), Some(true));
}

#[tokio::test]
async fn test_llm_outage_still_replies() {
    let llm = ScriptedLlm::new(|_| None, |_| None);
    let router = router_with(llm).await;

    let outcome = router
        .handle_turn(ChatRequest::new("u1", "s1", "I feel so stressed about exams"))
        .await
        .unwrap();

    assert_eq!(outcome.status, TurnStatus::Ok);
    assert!(outcome.degraded);
    assert_eq!(outcome.mode, Mode::BestFriend);
    assert_eq!(outcome.confidence, 0.5);
    assert!(!outcome.reply.is_empty());
    assert_ne!(outcome.reply, APOLOGY);

    let snapshot = router.context().sink.snapshot();
    assert_eq!(snapshot.warnings_by_kind.get("classifier_degraded"), Some(&1));
    assert_eq!(snapshot.errors_by_kind.get("upstream_unavailable"), Some(&1));
    assert_eq!(snapshot.errors_total, 1);
    assert_eq!(snapshot.degraded_replies, 1);
}

#[tokio::test]
async fn test_trace_ids_unique_under_concurrency() {
    let llm = ScriptedLlm::new(|_| Some("question".into()), |_| Some("sure".into()));
    let router = Arc::new(router_with(llm).await);

    let mut handles = Vec::new();
    for i in 0..20 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            router
                .handle_turn(ChatRequest::new(format!("u{}", i % 3), "s1", format!("hi {i}")))
                .await
                .unwrap()
                .trace_id
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }
    assert_eq!(ids.len(), 20);
}

#[tokio::test]
async fn test_session_footprint_upserted_in_place() {
    let llm = ScriptedLlm::new(|_| Some("question".into()), |_| Some("sure".into()));
    let router = router_with(llm).await;

    for text in ["one", "two", "three"] {
        router
            .handle_turn(ChatRequest::new("u1", "s1", text))
            .await
            .unwrap();
    }

    let sessions = router
        .context()
        .store
        .list(Namespace::Sessions, "u1")
        .await
        .unwrap();
    assert_eq!(sessions.len(), 1);
    let footprint: SessionFootprint = serde_json::from_value(sessions[0].value.clone()).unwrap();
    assert_eq!(footprint.turns, 3);
    assert_eq!(footprint.mode, "general");
    assert_eq!(footprint.category, "question");
}

#[tokio::test]
async fn test_invalid_request_is_rejected() {
    let llm = ScriptedLlm::new(|_| Some("task".into()), |_| Some("x".into()));
    let router = router_with(llm.clone()).await;

    let err = router
        .handle_turn(ChatRequest::new("u1", "s1", "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, BuddyError::InvalidRequest(_)));

    let err = router
        .handle_turn(ChatRequest::new("", "s1", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, BuddyError::InvalidRequest(_)));

    assert_eq!(warnings_of(&router, "invalid_request"), 2);
    assert!(llm.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_side_effect_does_not_block_reply() {
    let llm = ScriptedLlm::new(
        |_| Some("question".into()),
        |_| Some("Done.\nTOOL_CALL: {\"tool\": \"teleporter\", \"action\": \"beam\"}".into()),
    );
    let router = router_with(llm).await;

    let outcome = router
        .handle_turn(ChatRequest::new("u1", "s1", "beam me up"))
        .await
        .unwrap();
    assert_eq!(outcome.status, TurnStatus::Ok);
    assert_eq!(outcome.reply, "Done.");

    let snapshot = router.context().sink.snapshot();
    assert_eq!(snapshot.errors_by_kind.get("tool_error"), Some(&1));
}

struct BrokenAgent;

#[async_trait]
impl ModeAgent for BrokenAgent {
    fn mode(&self) -> Mode {
        Mode::General
    }

    fn read_namespaces(&self) -> &'static [Namespace] {
        &[]
    }

    fn system_prompt(&self) -> &str {
        ""
    }

    async fn handle(&self, _envelope: &Envelope, _context: &MemoryContext) -> Result<AgentReply> {
        Err(BuddyError::StorageFailure("disk vanished".into()))
    }
}

#[tokio::test]
async fn test_unexpected_failure_becomes_apology() {
    let llm = ScriptedLlm::new(|_| Some("question".into()), |_| Some("fine".into()));
    let mut ctx = BuddyContext::with_llm(&BuddyConfig::default(), llm)
        .await
        .unwrap();
    let broken: Arc<dyn ModeAgent> = Arc::new(BrokenAgent);
    ctx.agents = AgentSet::from_agents(broken.clone(), broken.clone(), broken);
    let router = Router::new(Arc::new(ctx));

    let outcome = router
        .handle_turn(ChatRequest::new("u1", "s1", "hello"))
        .await
        .unwrap();
    assert_eq!(outcome.status, TurnStatus::Failed);
    assert_eq!(outcome.reply, APOLOGY);
    assert!(!outcome.trace_id.is_empty());

    let snapshot = router.context().sink.snapshot();
    assert_eq!(snapshot.errors_by_kind.get("storage_failure"), Some(&1));
    assert_eq!(snapshot.total_requests, 1);
    assert_eq!(snapshot.requests_by_mode.get("general"), Some(&1));
    assert_eq!(snapshot.requests_by_category.get("error"), Some(&1));
    assert_eq!(snapshot.latency.samples, 1);
}
