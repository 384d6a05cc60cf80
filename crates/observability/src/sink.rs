//! [`ObservabilitySink`]: the one handle the router records through, plus
//! its `[observability]` config table.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::event::{Event, EventLog, EventType};
use crate::metrics::{Metrics, MetricsSnapshot, TurnSample};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Samples kept for latency percentiles
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Events retained in memory for the read endpoint
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// Optional JSONL file every event is appended to
    #[serde(default)]
    pub event_log_path: Option<PathBuf>,
}

fn default_window_size() -> usize {
    1000
}

fn default_max_events() -> usize {
    500
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            max_events: default_max_events(),
            event_log_path: None,
        }
    }
}

/// Single entry point for structured events and metrics.
///
/// Every method is infallible from the caller's point of view.
pub struct ObservabilitySink {
    events: EventLog,
    metrics: Metrics,
    sink_failures: AtomicU64,
}

impl ObservabilitySink {
    pub fn new(config: &ObservabilityConfig) -> Self {
        Self {
            events: EventLog::new(config.max_events, config.event_log_path.clone()),
            metrics: Metrics::new(config.window_size),
            sink_failures: AtomicU64::new(0),
        }
    }

    fn append(
        &self,
        event_type: EventType,
        kind: Option<String>,
        trace_id: &str,
        fields: serde_json::Value,
    ) -> Event {
        let (event, failure) = self.events.append(event_type, kind, trace_id, fields);
        if failure.is_some() {
            self.sink_failures.fetch_add(1, Ordering::Relaxed);
        }
        event
    }

    /// Record an informational event.
    pub fn record(&self, event_type: EventType, trace_id: &str, fields: serde_json::Value) {
        info!(
            target: "buddy::events",
            event_type = event_type.as_str(),
            trace_id,
            fields = %fields,
            "event"
        );
        self.append(event_type, None, trace_id, fields);
    }

    /// Record a recovered anomaly, counted under `kind`.
    pub fn warning(&self, trace_id: &str, kind: &str, fields: serde_json::Value) {
        warn!(target: "buddy::events", trace_id, kind, fields = %fields, "warning event");
        self.metrics.record_warning(kind);
        self.append(EventType::Warning, Some(kind.to_string()), trace_id, fields);
    }

    /// Record a failure, counted under `kind` (a `BuddyError::kind()`).
    pub fn error(&self, trace_id: &str, kind: &str, fields: serde_json::Value) {
        error!(target: "buddy::events", trace_id, kind, fields = %fields, "error event");
        self.metrics.record_error(kind);
        self.append(EventType::Error, Some(kind.to_string()), trace_id, fields);
    }

    /// Fold a finished turn into the metrics and log it.
    pub fn record_turn(&self, trace_id: &str, sample: TurnSample) {
        self.metrics.record_turn(&sample);
        self.record(
            EventType::Turn,
            trace_id,
            json!({
                "mode": sample.mode.as_str(),
                "category": sample.category,
                "latency_ms": sample.latency_ms,
                "prompt_tokens": sample.tokens.prompt_tokens,
                "completion_tokens": sample.tokens.completion_tokens,
                "degraded": sample.degraded,
            }),
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = self.metrics.snapshot();
        snapshot.sink_failures =
            self.sink_failures.load(Ordering::Relaxed) + self.events.dropped_lines();
        snapshot.events_retained = self.events.len();
        snapshot
    }

    /// Most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        self.events.recent(limit)
    }
}

impl Default for ObservabilitySink {
    fn default() -> Self {
        Self::new(&ObservabilityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buddy_common::{Mode, TokenUsage};

    #[test]
    fn test_warning_counted_and_logged_once() {
        let sink = ObservabilitySink::default();
        sink.warning("t1", "unknown_mode", json!({"value": "doesnotexist"}));

        let events = sink.recent(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Warning);
        assert_eq!(events[0].kind.as_deref(), Some("unknown_mode"));
        assert_eq!(sink.snapshot().warnings_by_kind["unknown_mode"], 1);
    }

    #[test]
    fn test_record_turn_updates_snapshot() {
        let sink = ObservabilitySink::default();
        sink.record_turn(
            "t1",
            TurnSample {
                mode: Mode::Mentor,
                category: "planning".into(),
                latency_ms: 120.0,
                tokens: TokenUsage {
                    prompt_tokens: 3,
                    completion_tokens: 4,
                },
                degraded: false,
            },
        );
        let snap = sink.snapshot();
        assert_eq!(snap.total_requests, 1);
        assert_eq!(snap.total_tokens, 7);
        assert_eq!(snap.events_retained, 1);
        assert_eq!(sink.recent(1)[0].event_type, EventType::Turn);
    }

    #[test]
    fn test_file_failure_is_swallowed_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ObservabilitySink::new(&ObservabilityConfig {
            event_log_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        });
        sink.error("t1", "upstream_unavailable", json!({}));
        sink.record(EventType::Route, "t1", json!({}));

        let snap = sink.snapshot();
        assert_eq!(snap.sink_failures, 2);
        assert_eq!(snap.errors_by_kind["upstream_unavailable"], 1);
        assert_eq!(sink.recent(10).len(), 2);
    }

    #[test]
    fn test_config_from_toml() {
        let config: ObservabilityConfig = toml::from_str(
            r#"
window_size = 50
event_log_path = "logs/events.jsonl"
"#,
        )
        .unwrap();
        assert_eq!(config.window_size, 50);
        assert_eq!(config.max_events, 500);
        assert!(config.event_log_path.is_some());
    }
}
