//! Persisted facts and the namespaces they live in.

use crate::{BuddyError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical partition of the memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Tasks,
    Events,
    MentorPlans,
    Sessions,
    Generic,
}

impl Namespace {
    pub const ALL: [Namespace; 5] = [
        Namespace::Tasks,
        Namespace::Events,
        Namespace::MentorPlans,
        Namespace::Sessions,
        Namespace::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Tasks => "tasks",
            Namespace::Events => "events",
            Namespace::MentorPlans => "mentor_plans",
            Namespace::Sessions => "sessions",
            Namespace::Generic => "generic",
        }
    }

    /// Whether records in this namespace are embedded into the semantic index.
    ///
    /// Session footprints are bookkeeping and never retrieved by similarity.
    pub fn is_indexed(&self) -> bool {
        !matches!(self, Namespace::Sessions)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = BuddyError;

    fn from_str(s: &str) -> Result<Self> {
        Namespace::ALL
            .into_iter()
            .find(|ns| ns.as_str() == s)
            .ok_or_else(|| BuddyError::InvalidRequest(format!("unknown namespace: {s}")))
    }
}

/// A fact stored under `(namespace, user_id, key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub namespace: Namespace,

    pub user_id: String,

    pub key: String,

    pub value: serde_json::Value,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Insertion sequence within the user partition; survives overwrites.
    #[serde(default)]
    pub seq: i64,
}

impl MemoryRecord {
    /// Reference used by the semantic index: `<namespace>/<key>`.
    pub fn source_ref(&self) -> String {
        record_source_ref(self.namespace, &self.key)
    }

    /// Text that represents this record for similarity search.
    pub fn index_text(&self) -> String {
        let field = |name: &str| {
            self.value
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        match self.namespace {
            Namespace::Tasks => {
                let due = field("due");
                if due.is_empty() {
                    format!("task: {}", field("text"))
                } else {
                    format!("task: {} (due {})", field("text"), due)
                }
            }
            Namespace::Events => format!(
                "event: {} on {} {}",
                field("title"),
                field("date"),
                field("time")
            )
            .trim_end()
            .to_string(),
            Namespace::MentorPlans => format!("plan: {}\n{}", field("topic"), field("content")),
            Namespace::Sessions | Namespace::Generic => match &self.value {
                serde_json::Value::String(s) => format!("{}: {}", self.key, s),
                other => format!("{}: {}", self.key, other),
            },
        }
    }
}

pub fn record_source_ref(namespace: Namespace, key: &str) -> String {
    format!("{}/{}", namespace.as_str(), key)
}

/// Value stored under `mentor_plans/latest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentorPlan {
    pub topic: String,
    pub content: String,
}

/// Value stored under `sessions/<session_id>` after every turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFootprint {
    pub mode: String,
    pub category: String,
    pub confidence: f32,
    pub trace_id: String,
    pub turns: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(namespace: Namespace, key: &str, value: serde_json::Value) -> MemoryRecord {
        let now = Utc::now();
        MemoryRecord {
            namespace,
            user_id: "u1".into(),
            key: key.into(),
            value,
            created_at: now,
            updated_at: now,
            seq: 1,
        }
    }

    #[test]
    fn test_namespace_round_trip_names() {
        for ns in Namespace::ALL {
            assert_eq!(ns.as_str().parse::<Namespace>().unwrap(), ns);
        }
        assert!("bogus".parse::<Namespace>().is_err());
    }

    #[test]
    fn test_source_ref() {
        let r = record(Namespace::Tasks, "task_1", json!({"text": "x"}));
        assert_eq!(r.source_ref(), "tasks/task_1");
    }

    #[test]
    fn test_index_text_per_namespace() {
        let task = record(
            Namespace::Tasks,
            "t",
            json!({"text": "finish report", "due": "tomorrow"}),
        );
        assert_eq!(task.index_text(), "task: finish report (due tomorrow)");

        let event = record(
            Namespace::Events,
            "e",
            json!({"title": "Standup", "date": "2026-01-05", "time": ""}),
        );
        assert_eq!(event.index_text(), "event: Standup on 2026-01-05");

        let fact = record(Namespace::Generic, "favorite_color", json!("blue"));
        assert_eq!(fact.index_text(), "favorite_color: blue");
    }

    #[test]
    fn test_sessions_not_indexed() {
        assert!(!Namespace::Sessions.is_indexed());
        assert!(Namespace::Generic.is_indexed());
    }
}
