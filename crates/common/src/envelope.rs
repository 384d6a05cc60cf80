//! The per-turn request wrapper and the closed set of agent modes.

use crate::{BuddyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Persona/behavior variant applied to a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    General,
    Mentor,
    BestFriend,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::General, Mode::Mentor, Mode::BestFriend];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::General => "general",
            Mode::Mentor => "mentor",
            Mode::BestFriend => "bestfriend",
        }
    }

    /// Dense index, used for fixed-size per-mode counters.
    pub fn index(&self) -> usize {
        match self {
            Mode::General => 0,
            Mode::Mentor => 1,
            Mode::BestFriend => 2,
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::General
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = BuddyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "general" => Ok(Mode::General),
            "mentor" => Ok(Mode::Mentor),
            "bestfriend" | "best_friend" | "best-friend" => Ok(Mode::BestFriend),
            other => Err(BuddyError::UnknownMode(other.to_string())),
        }
    }
}

/// A single chat turn travelling through the pipeline.
///
/// Created at router entry and dropped once the reply is sent. Only derived
/// fields (session footprint, side effects, history) are ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-turn correlation id
    pub trace_id: String,

    pub user_id: String,

    pub session_id: String,

    /// Raw user message
    pub text: String,

    /// Explicit mode selector as supplied by the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl Envelope {
    /// Build an envelope with a fresh trace id.
    ///
    /// `user_id` and `text` must be non-empty after trimming.
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        text: impl Into<String>,
        mode: Option<String>,
    ) -> Result<Self> {
        let user_id = user_id.into();
        let text = text.into();

        if user_id.trim().is_empty() {
            return Err(BuddyError::InvalidRequest("user_id must not be empty".into()));
        }
        if text.trim().is_empty() {
            return Err(BuddyError::InvalidRequest("message must not be empty".into()));
        }

        let mut session_id = session_id.into();
        if session_id.trim().is_empty() {
            session_id = "default".into();
        }

        Ok(Self {
            trace_id: new_trace_id(),
            user_id: user_id.trim().to_string(),
            session_id,
            text,
            mode: mode.filter(|m| !m.trim().is_empty()),
        })
    }

    /// Short prefix of the message, for logs.
    pub fn preview(&self) -> String {
        self.text.chars().take(50).collect()
    }
}

pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
