//! Turn coordination for Smart Buddy.
//!
//! The [`Router`] is the single entry point for a chat turn:
//!
//! ```text
//! ChatRequest
//!      │  validate, assign trace id
//!      ▼
//! ┌──────────────┐  explicit mode? ──yes──┐
//! │    Router    │                        │
//! └──────┬───────┘                        │
//!        │ no                             │
//!        ▼                                │
//!  IntentClassifier ──LLM down──▶ KeywordClassifier
//!        │                                │
//!        ▼                                ▼
//!            Mode ─▶ AgentSet ─▶ ModeAgent
//!                                   │ reply + side effects
//!                                   ▼
//!          MemoryStore / ToolRegistry / ObservabilitySink
//! ```
//!
//! All long-lived components live in an explicit [`BuddyContext`] built
//! from [`BuddyConfig`].

pub mod config;
pub mod context;
pub mod intent;
pub mod router;
pub mod routing;

pub use config::{BuddyConfig, ToolsConfig};
pub use context::BuddyContext;
pub use intent::{parse_category, IntentClassifier, KeywordClassifier};
pub use router::{ChatRequest, Router, TurnOutcome, TurnStatus, APOLOGY};
pub use routing::{Classification, IntentCategory, RouteDecision, RouteSource};
