//! Turn routing: validate, pick a mode, run the agent, persist what it
//! produced and record the turn.

use std::sync::Arc;
use std::time::Instant;

use buddy_agents::ToolRequest;
use buddy_common::{
    new_trace_id, AgentReply, BuddyError, Envelope, HistoryTurn, MemoryContext, Mode, Namespace,
    Result, SessionFootprint, SideEffect,
};
use buddy_observability::{EventType, TurnSample};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::context::BuddyContext;
use crate::intent::{IntentClassifier, KeywordClassifier};
use crate::routing::{RouteDecision, RouteSource};

/// Reply sent when a turn fails unexpectedly.
pub const APOLOGY: &str = "I'm sorry, something went wrong on my side. Please try again in a moment.";

/// Inbound turn, as handed over by a transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,

    /// Empty means `default`
    #[serde(default)]
    pub session_id: String,

    pub text: String,

    #[serde(default)]
    pub mode: Option<String>,
}

impl ChatRequest {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            text: text.into(),
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Ok,
    Failed,
}

/// The annotated reply for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub trace_id: String,
    pub mode: Mode,
    pub category: String,
    pub confidence: f32,
    pub latency_ms: f64,
    /// The agent answered with a canned reply because the LLM was down
    pub degraded: bool,
    pub status: TurnStatus,
}

/// Entry point for chat turns.
///
/// Cheap to share: hold it in an `Arc` and call [`handle_turn`] from any
/// task.
///
/// [`handle_turn`]: Router::handle_turn
pub struct Router {
    ctx: Arc<BuddyContext>,
    classifier: IntentClassifier,
    keywords: KeywordClassifier,
}

impl Router {
    pub fn new(ctx: Arc<BuddyContext>) -> Self {
        let classifier = IntentClassifier::new(ctx.llm.clone());
        Self {
            ctx,
            classifier,
            keywords: KeywordClassifier,
        }
    }

    pub fn context(&self) -> &Arc<BuddyContext> {
        &self.ctx
    }

    /// Run one turn.
    ///
    /// Only `InvalidRequest` comes back as `Err`. Every other failure is
    /// recorded as an `error` event and turned into an apology with
    /// [`TurnStatus::Failed`].
    pub async fn handle_turn(&self, request: ChatRequest) -> Result<TurnOutcome> {
        let started = Instant::now();

        let envelope = match Envelope::new(
            request.user_id,
            request.session_id,
            request.text,
            request.mode,
        ) {
            Ok(envelope) => envelope,
            Err(e) => {
                let trace_id = new_trace_id();
                self.ctx
                    .sink
                    .warning(&trace_id, e.kind(), json!({ "error": e.to_string() }));
                return Err(e);
            }
        };

        info!(
            trace_id = %envelope.trace_id,
            user_id = %envelope.user_id,
            session_id = %envelope.session_id,
            preview = %envelope.preview(),
            "Handling turn"
        );

        match self.run(&envelope, started).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(trace_id = %envelope.trace_id, error = %e, "Turn failed");
                self.ctx.sink.error(
                    &envelope.trace_id,
                    e.kind(),
                    json!({
                        "stage": "turn",
                        "user_id": envelope.user_id,
                        "error": e.to_string(),
                    }),
                );
                let latency_ms = elapsed_ms(started);
                self.ctx.sink.record_turn(
                    &envelope.trace_id,
                    TurnSample {
                        mode: Mode::General,
                        category: "error".into(),
                        latency_ms,
                        tokens: Default::default(),
                        degraded: false,
                    },
                );
                Ok(TurnOutcome {
                    reply: APOLOGY.into(),
                    trace_id: envelope.trace_id,
                    mode: Mode::General,
                    category: "error".into(),
                    confidence: 0.0,
                    latency_ms,
                    degraded: false,
                    status: TurnStatus::Failed,
                })
            }
        }
    }

    async fn run(&self, envelope: &Envelope, started: Instant) -> Result<TurnOutcome> {
        let route = self.resolve(envelope).await?;
        let agent = self.ctx.agents.get(route.mode);

        let context = match self
            .ctx
            .retriever
            .build_context(
                &envelope.user_id,
                &envelope.session_id,
                &envelope.text,
                agent.read_namespaces(),
            )
            .await
        {
            Ok(context) => context,
            Err(e) => {
                warn!(trace_id = %envelope.trace_id, error = %e, "Context unavailable, answering without memory");
                self.ctx.sink.error(
                    &envelope.trace_id,
                    e.kind(),
                    json!({ "stage": "context", "error": e.to_string() }),
                );
                MemoryContext::default()
            }
        };

        let reply = agent.handle(envelope, &context).await?;
        if reply.degraded {
            self.ctx.sink.error(
                &envelope.trace_id,
                "upstream_unavailable",
                json!({ "stage": "agent", "mode": route.mode.as_str() }),
            );
        }

        self.ctx.history.push(
            &envelope.user_id,
            &envelope.session_id,
            HistoryTurn::user(envelope.text.clone()),
        );
        self.ctx.history.push(
            &envelope.user_id,
            &envelope.session_id,
            HistoryTurn::assistant(reply.reply.clone()),
        );

        if let Err(e) = self.ctx.store.remember(&envelope.user_id, &envelope.text).await {
            self.ctx.sink.error(
                &envelope.trace_id,
                e.kind(),
                json!({ "stage": "snippet", "error": e.to_string() }),
            );
        }

        let applied = self.apply_side_effects(envelope, &reply).await;
        self.record_footprint(envelope, &route).await;

        let latency_ms = elapsed_ms(started);
        self.ctx.sink.record(
            EventType::Route,
            &envelope.trace_id,
            json!({
                "user_id": envelope.user_id,
                "session_id": envelope.session_id,
                "mode": route.mode.as_str(),
                "category": route.category,
                "confidence": route.confidence,
                "source": route.source,
                "text_len": envelope.text.chars().count(),
                "latency_ms": latency_ms,
                "degraded": reply.degraded,
                "side_effects": applied,
            }),
        );
        self.ctx.sink.record_turn(
            &envelope.trace_id,
            TurnSample {
                mode: route.mode,
                category: route.category.clone(),
                latency_ms,
                tokens: reply.tokens,
                degraded: reply.degraded,
            },
        );

        info!(
            trace_id = %envelope.trace_id,
            mode = %route.mode,
            category = %route.category,
            latency_ms,
            degraded = reply.degraded,
            "Turn complete"
        );

        Ok(TurnOutcome {
            reply: reply.reply,
            trace_id: envelope.trace_id.clone(),
            mode: route.mode,
            category: route.category,
            confidence: route.confidence,
            latency_ms,
            degraded: reply.degraded,
            status: TurnStatus::Ok,
        })
    }

    /// Explicit mode wins; otherwise classify, degrading to keywords when the
    /// LLM is unreachable.
    async fn resolve(&self, envelope: &Envelope) -> Result<RouteDecision> {
        if let Some(requested) = &envelope.mode {
            return Ok(match requested.parse::<Mode>() {
                Ok(mode) => RouteDecision::explicit(mode),
                Err(e) => {
                    self.ctx.sink.warning(
                        &envelope.trace_id,
                        e.kind(),
                        json!({ "requested": requested, "fallback": Mode::General.as_str() }),
                    );
                    RouteDecision::unknown_mode()
                }
            });
        }

        let history = self.ctx.history.recent(
            &envelope.user_id,
            &envelope.session_id,
            self.ctx.config.memory.history_in_prompt,
        );
        match self.classifier.classify(&envelope.text, &history).await {
            Ok(classification) => Ok(RouteDecision::classified(classification, RouteSource::Classifier)),
            Err(BuddyError::UpstreamUnavailable(reason)) => {
                self.ctx.sink.warning(
                    &envelope.trace_id,
                    "classifier_degraded",
                    json!({ "reason": reason }),
                );
                Ok(RouteDecision::classified(
                    self.keywords.classify(&envelope.text),
                    RouteSource::KeywordFallback,
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Apply the agent's side effects in order. Failures are recorded and
    /// skipped. Returns how many succeeded.
    async fn apply_side_effects(&self, envelope: &Envelope, reply: &AgentReply) -> usize {
        let user_id = envelope.user_id.as_str();
        let mut applied = 0;

        for effect in &reply.side_effects {
            let result = match effect {
                SideEffect::Upsert {
                    namespace,
                    key,
                    value,
                } => self
                    .ctx
                    .store
                    .upsert(*namespace, user_id, key, value.clone())
                    .await
                    .map(|_| ()),
                SideEffect::Delete { namespace, key } => {
                    self.ctx.store.delete(*namespace, user_id, key).await
                }
                SideEffect::Remember { text } => {
                    self.ctx.store.remember(user_id, text).await.map(|_| ())
                }
                SideEffect::ToolCall {
                    tool,
                    action,
                    arguments,
                } => {
                    let request =
                        ToolRequest::new(user_id, &envelope.trace_id, action, arguments.clone());
                    self.ctx.tools.call(tool, request).await.map(|output| {
                        debug!(trace_id = %envelope.trace_id, tool = %output.tool, "Tool call applied");
                    })
                }
            };

            match result {
                Ok(()) => {
                    applied += 1;
                    self.ctx.sink.record(
                        EventType::SideEffect,
                        &envelope.trace_id,
                        json!({ "kind": effect.kind(), "user_id": user_id }),
                    );
                }
                Err(e) => self.ctx.sink.error(
                    &envelope.trace_id,
                    e.kind(),
                    json!({
                        "stage": "side_effect",
                        "effect": effect.kind(),
                        "error": e.to_string(),
                    }),
                ),
            }
        }
        applied
    }

    async fn record_footprint(&self, envelope: &Envelope, route: &RouteDecision) {
        let previous_turns = self
            .ctx
            .store
            .get(Namespace::Sessions, &envelope.user_id, &envelope.session_id)
            .await
            .ok()
            .and_then(|record| serde_json::from_value::<SessionFootprint>(record.value).ok())
            .map_or(0, |footprint| footprint.turns);

        let footprint = SessionFootprint {
            mode: route.mode.as_str().into(),
            category: route.category.clone(),
            confidence: route.confidence,
            trace_id: envelope.trace_id.clone(),
            turns: previous_turns + 1,
        };

        let result = match serde_json::to_value(&footprint) {
            Ok(value) => self
                .ctx
                .store
                .upsert(Namespace::Sessions, &envelope.user_id, &envelope.session_id, value)
                .await
                .map(|_| ()),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            self.ctx.sink.error(
                &envelope.trace_id,
                e.kind(),
                json!({ "stage": "session_footprint", "error": e.to_string() }),
            );
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
