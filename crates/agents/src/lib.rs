//! Mode agents for Smart Buddy.
//!
//! - **General**: todo list, calendar and everyday questions
//! - **Mentor**: teaching, advice, planning, problem solving and review
//! - **BestFriend**: casual emotional support
//!
//! Each agent implements [`buddy_common::ModeAgent`]: it receives the turn's
//! [`Envelope`](buddy_common::Envelope) plus an assembled
//! [`MemoryContext`](buddy_common::MemoryContext), makes at most one LLM call
//! and returns the reply together with the side effects the router should
//! persist. LLM failures never surface as errors; they degrade to a canned
//! reply in the agent's tone.
//!
//! ```text
//!              ┌──────────────────────────────┐
//!  Envelope ──▶│ General / Mentor / BestFriend │──▶ AgentReply
//!  Context  ──▶│   prompt ─▶ LLM ─▶ extract    │    (reply, side effects,
//!              └──────────────┬───────────────┘     tokens, advisories)
//!                             │
//!                             ▼
//!                       ToolRegistry
//!             (calendar · time · kv · docs)
//! ```

pub mod bestfriend;
pub mod general;
pub mod mentor;
pub mod prompt;
pub mod side_effects;
pub mod tools;

pub use bestfriend::BestFriendAgent;
pub use general::GeneralAgent;
pub use mentor::{MentorAgent, MentorStyle};
pub use side_effects::{extract, user_fact, Extraction};
pub use tools::{Tool, ToolOutput, ToolRegistry, ToolRequest};

use std::sync::Arc;

use buddy_common::{Mode, ModeAgent};
use buddy_llm::LlmClient;

/// One agent per [`Mode`], selected by exhaustive match.
pub struct AgentSet {
    general: Arc<dyn ModeAgent>,
    mentor: Arc<dyn ModeAgent>,
    bestfriend: Arc<dyn ModeAgent>,
}

impl AgentSet {
    /// The three built-in personas sharing one LLM client.
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            general: Arc::new(GeneralAgent::new(llm.clone()).with_tools(tools)),
            mentor: Arc::new(MentorAgent::new(llm.clone())),
            bestfriend: Arc::new(BestFriendAgent::new(llm)),
        }
    }

    /// Assemble from arbitrary agents, e.g. test doubles.
    pub fn from_agents(
        general: Arc<dyn ModeAgent>,
        mentor: Arc<dyn ModeAgent>,
        bestfriend: Arc<dyn ModeAgent>,
    ) -> Self {
        Self {
            general,
            mentor,
            bestfriend,
        }
    }

    pub fn get(&self, mode: Mode) -> &Arc<dyn ModeAgent> {
        match mode {
            Mode::General => &self.general,
            Mode::Mentor => &self.mentor,
            Mode::BestFriend => &self.bestfriend,
        }
    }
}
