//! HTTP handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use buddy_common::{new_trace_id, BuddyError, MemoryRecord, Mode, Namespace};
use buddy_coordinator::{ChatRequest, TurnOutcome, TurnStatus, APOLOGY};
use buddy_observability::{Event, MetricsSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::AppState;

const DEFAULT_EVENT_LIMIT: usize = 50;
const INVALID_CHAT_REPLY: &str = "Please include a user_id and a non-empty message.";
const MAX_EVENT_LIMIT: usize = 1000;

/// Error body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    /// User-facing text, set on chat errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

/// A [`BuddyError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn internal(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorResponse {
                error: error.into(),
                code: "internal_error",
                reply: None,
            },
        }
    }

    fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.body.reply = Some(reply.into());
        self
    }
}

impl From<BuddyError> for ApiError {
    fn from(e: BuddyError) -> Self {
        let status = match &e {
            BuddyError::NotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            body: ErrorResponse {
                error: e.to_string(),
                code: e.kind(),
                reply: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub model: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        model: state.context().llm.model_name().to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub trace_id: String,
    pub mode: Mode,
    pub category: String,
    pub confidence: f32,
    pub latency_ms: f64,
    pub degraded: bool,
}

impl From<TurnOutcome> for ChatResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            reply: outcome.reply,
            trace_id: outcome.trace_id,
            mode: outcome.mode,
            category: outcome.category,
            confidence: outcome.confidence,
            latency_ms: outcome.latency_ms,
            degraded: outcome.degraded,
        }
    }
}

/// `POST /chat`.
///
/// The turn runs on its own task, so a client that hangs up does not cancel
/// it half way through persisting side effects.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            let detail = rejection.body_text();
            debug!(%detail, "Rejected chat body");
            state.context().sink.warning(
                &new_trace_id(),
                "invalid_request",
                serde_json::json!({ "error": detail }),
            );
            return Err(ApiError::from(BuddyError::InvalidRequest(detail))
                .with_reply(INVALID_CHAT_REPLY));
        }
    };

    let request = ChatRequest {
        user_id: body.user_id,
        session_id: body.session_id.unwrap_or_default(),
        text: body.message,
        mode: body.mode,
    };

    let router = state.router.clone();
    let turn = tokio::spawn(async move { router.handle_turn(request).await })
        .await
        .map_err(|e| {
            error!(error = %e, "Turn task panicked");
            ApiError::internal("turn task failed").with_reply(APOLOGY)
        })?;

    match turn {
        Ok(outcome) => {
            let status = match outcome.status {
                TurnStatus::Ok => StatusCode::OK,
                TurnStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
            };
            info!(
                trace_id = %outcome.trace_id,
                mode = %outcome.mode,
                status = status.as_u16(),
                "Chat turn served"
            );
            Ok((status, Json(ChatResponse::from(outcome))).into_response())
        }
        Err(e) => Err(ApiError::from(e).with_reply(INVALID_CHAT_REPLY)),
    }
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.context().sink.snapshot())
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

/// `GET /api/v1/events?limit=N`, newest first.
pub async fn recent_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<Event>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .min(MAX_EVENT_LIMIT);
    Json(state.context().sink.recent(limit))
}

#[derive(Debug, Serialize)]
pub struct RecordsResponse {
    pub namespace: Namespace,
    pub user_id: String,
    pub count: usize,
    pub records: Vec<MemoryRecord>,
}

async fn list_namespace(
    state: &AppState,
    namespace: Namespace,
    user_id: String,
) -> Result<Json<RecordsResponse>, ApiError> {
    let records = state.context().store.list(namespace, &user_id).await?;
    Ok(Json(RecordsResponse {
        namespace,
        user_id,
        count: records.len(),
        records,
    }))
}

pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Path((namespace, user_id)): Path<(String, String)>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let namespace: Namespace = namespace.parse()?;
    list_namespace(&state, namespace, user_id).await
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<RecordsResponse>, ApiError> {
    list_namespace(&state, Namespace::Tasks, user_id).await
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<RecordsResponse>, ApiError> {
    list_namespace(&state, Namespace::Events, user_id).await
}

/// `DELETE /api/v1/records/{namespace}/{user_id}/{key}`; deleting a missing
/// record still answers 204.
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Path((namespace, user_id, key)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let namespace: Namespace = namespace.parse()?;
    state.context().store.delete(namespace, &user_id, &key).await?;
    info!(%namespace, user_id, key, "Record deleted via API");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let bad = ApiError::from(BuddyError::InvalidRequest("empty".into()));
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.body.code, "invalid_request");

        let missing = ApiError::from(BuddyError::NotFound("x".into()));
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let storage = ApiError::from(BuddyError::StorageFailure("disk".into())).with_reply("sorry");
        assert_eq!(storage.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(storage.body.reply.as_deref(), Some("sorry"));
    }

    #[test]
    fn test_chat_body_defaults() {
        let body: ChatBody = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert!(body.user_id.is_empty());
        assert!(body.session_id.is_none());
        assert!(body.mode.is_none());
    }
}
