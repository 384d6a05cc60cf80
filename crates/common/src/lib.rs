//! Common types and traits shared across the Smart Buddy crates.
//!
//! Everything that crosses a crate boundary lives here: the error taxonomy,
//! the per-turn [`Envelope`], persisted [`MemoryRecord`]s and the
//! [`ModeAgent`] contract.

pub mod envelope;
pub mod error;
pub mod message;
pub mod record;
pub mod security;
pub mod task;
pub mod traits;

pub use envelope::{new_trace_id, Envelope, Mode};
pub use error::{BuddyError, Result};
pub use message::{HistoryTurn, MessageRole};
pub use record::{record_source_ref, MemoryRecord, MentorPlan, Namespace, SessionFootprint};
pub use task::{EventItem, TaskItem, TaskPriority, TaskStatus};
pub use traits::{AgentReply, MemoryContext, ModeAgent, SearchHit, SideEffect, TokenUsage};
