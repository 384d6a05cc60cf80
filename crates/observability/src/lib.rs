//! Observability sink: an append-only structured event log plus running
//! request metrics.
//!
//! Nothing in this crate returns an error to the caller. Failures writing
//! the optional JSONL file are counted and logged, then swallowed.

pub mod event;
pub mod metrics;
pub mod sink;

pub use event::{Event, EventLog, EventType};
pub use metrics::{LatencySummary, Metrics, MetricsSnapshot, TurnSample};
pub use sink::{ObservabilityConfig, ObservabilitySink};
