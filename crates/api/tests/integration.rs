//! API tests against a real server on a random local port.

use std::sync::Arc;

use async_trait::async_trait;
use buddy_api::{create_router, ApiKey, AppState};
use buddy_common::{BuddyError, Result};
use buddy_coordinator::{BuddyConfig, BuddyContext};
use buddy_llm::{LlmClient, LlmRequest, LlmResponse};
use serde_json::{json, Value};

/// Classifier prompts get `category`; everything else gets `reply`.
/// `None` simulates an outage.
struct StubLlm {
    category: Option<&'static str>,
    reply: Option<&'static str>,
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let classifying = request
            .last_user_message()
            .is_some_and(|m| m.starts_with("Classify the user's message"));
        let answer = if classifying { self.category } else { self.reply };
        answer
            .map(|content| LlmResponse {
                content: content.into(),
                model: "stub".into(),
                usage: None,
                finish_reason: None,
            })
            .ok_or_else(|| BuddyError::UpstreamUnavailable("stub outage".into()))
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

const TASK_REPLY: &str =
    r#"TASK_CREATED: {"text": "finish report", "priority": "normal", "deadline": "tomorrow"}"#;

async fn start_server(llm: StubLlm, api_key: Option<&str>) -> String {
    let ctx = BuddyContext::with_llm(&BuddyConfig::default(), Arc::new(llm))
        .await
        .unwrap();
    let mut state = AppState::new(ctx);
    if let Some(key) = api_key {
        state = state.with_api_key(ApiKey::new(key));
    }
    let router = create_router(Arc::new(state), None);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn task_server() -> String {
    start_server(
        StubLlm {
            category: Some("task"),
            reply: Some(TASK_REPLY),
        },
        None,
    )
    .await
}

async fn post_chat(base: &str, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{base}{path}"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn get_json(base: &str, path: &str) -> (u16, Value) {
    let resp = reqwest::get(format!("{base}{path}")).await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health() {
    let base = task_server().await;
    let (status, body) = get_json(&base, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model"], "stub");
}

#[tokio::test]
async fn test_chat_creates_task() {
    let base = task_server().await;
    let (status, body) = post_chat(
        &base,
        "/chat",
        json!({"user_id": "u1", "message": "Add task to finish report tomorrow"}),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["mode"], "general");
    assert_eq!(body["category"], "task");
    assert_eq!(body["degraded"], false);
    assert!(body["reply"].as_str().unwrap().contains("finish report"));
    assert!(!body["trace_id"].as_str().unwrap().is_empty());
    assert!(body["latency_ms"].as_f64().unwrap() >= 0.0);

    let (status, tasks) = get_json(&base, "/api/v1/tasks/u1").await;
    assert_eq!(status, 200);
    assert_eq!(tasks["count"], 1);
    assert_eq!(tasks["records"][0]["value"]["text"], "finish report");
}

#[tokio::test]
async fn test_versioned_chat_alias() {
    let base = task_server().await;
    let (status, body) = post_chat(
        &base,
        "/api/v1/chat",
        json!({"user_id": "u1", "session_id": "s1", "message": "hello", "mode": "mentor"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["mode"], "mentor");
    assert_eq!(body["category"], "explicit");
}

#[tokio::test]
async fn test_empty_message_is_bad_request() {
    let base = task_server().await;
    let (status, body) = post_chat(&base, "/chat", json!({"user_id": "u1", "message": "  "})).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "invalid_request");
    assert!(body["reply"].is_string());

    let (status, _) = post_chat(&base, "/chat", json!({"message": "hi"})).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_malformed_body_gets_error_envelope() {
    let base = task_server().await;
    let (status, body) = post_chat(&base, "/chat", json!({"user_id": 42, "message": "hi"})).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "invalid_request");
    assert!(body["error"].is_string());
    assert!(body["reply"].is_string());

    let resp = reqwest::Client::new()
        .post(format!("{base}/chat"))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "invalid_request");

    let resp = reqwest::Client::new()
        .post(format!("{base}/chat"))
        .body("user_id=u1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let (_, metrics) = get_json(&base, "/metrics").await;
    assert_eq!(metrics["warnings_by_kind"]["invalid_request"], 3);
    assert_eq!(metrics["total_requests"], 0);
}

#[tokio::test]
async fn test_outage_still_answers() {
    let base = start_server(StubLlm { category: None, reply: None }, None).await;
    let (status, body) = post_chat(
        &base,
        "/chat",
        json!({"user_id": "u1", "message": "what's up?"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["degraded"], true);
    assert_eq!(body["confidence"], 0.5);
}

#[tokio::test]
async fn test_metrics_and_events() {
    let base = task_server().await;
    post_chat(&base, "/chat", json!({"user_id": "u1", "message": "Add task to finish report tomorrow"})).await;

    let (status, metrics) = get_json(&base, "/metrics").await;
    assert_eq!(status, 200);
    assert_eq!(metrics["total_requests"], 1);
    assert_eq!(metrics["requests_by_mode"]["general"], 1);

    let (status, events) = get_json(&base, "/api/v1/events?limit=2").await;
    assert_eq!(status, 200);
    assert_eq!(events.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_record_listing_and_deletion() {
    let base = task_server().await;
    post_chat(&base, "/chat", json!({"user_id": "u1", "message": "Add task to finish report tomorrow"})).await;

    let (_, tasks) = get_json(&base, "/api/v1/records/tasks/u1").await;
    let key = tasks["records"][0]["key"].as_str().unwrap().to_string();

    let client = reqwest::Client::new();
    for _ in 0..2 {
        let resp = client
            .delete(format!("{base}/api/v1/records/tasks/u1/{key}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 204);
    }

    let (_, tasks) = get_json(&base, "/api/v1/records/tasks/u1").await;
    assert_eq!(tasks["count"], 0);

    let (status, body) = get_json(&base, "/api/v1/records/gossip/u1").await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn test_bearer_auth() {
    let base = start_server(
        StubLlm {
            category: Some("question"),
            reply: Some("hi!"),
        },
        Some("s3cret"),
    )
    .await;
    let client = reqwest::Client::new();
    let body = json!({"user_id": "u1", "message": "hello"});

    let health = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(health.status().as_u16(), 200);

    let missing = client
        .post(format!("{base}/chat"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 401);

    let wrong = client
        .post(format!("{base}/chat"))
        .bearer_auth("nope")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status().as_u16(), 401);

    let ok = client
        .post(format!("{base}/chat"))
        .bearer_auth("s3cret")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status().as_u16(), 200);
}
