//! Items the general agent keeps in the `tasks` and `events` namespaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    /// Lenient parse used on LLM output; unknown words fall back to normal.
    pub fn parse_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" | "urgent" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Done,
}

/// A to-do item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub text: String,

    #[serde(default)]
    pub priority: TaskPriority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,

    #[serde(default)]
    pub status: TaskStatus,

    pub created_at: DateTime<Utc>,
}

impl TaskItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            priority: TaskPriority::Normal,
            due: None,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn with_due(mut self, due: impl Into<String>) -> Self {
        let due = due.into();
        self.due = (!due.trim().is_empty()).then(|| due.trim().to_string());
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Fresh storage key for a new task.
    pub fn new_key() -> String {
        format!("task_{}", uuid::Uuid::new_v4().simple())
    }

    /// User-facing confirmation line.
    pub fn confirmation(&self) -> String {
        match &self.due {
            Some(due) => format!("✅ Added: {} - Due: {}", self.text, due),
            None => format!("✅ Added: {}", self.text),
        }
    }
}

/// A calendar hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventItem {
    pub title: String,

    pub date: String,

    #[serde(default)]
    pub time: String,
}

impl EventItem {
    pub fn new_key() -> String {
        format!("event_{}", uuid::Uuid::new_v4().simple())
    }

    pub fn confirmation(&self) -> String {
        if self.time.is_empty() {
            format!("📅 Scheduled: {} on {}", self.title, self.date)
        } else {
            format!("📅 Scheduled: {} on {} at {}", self.title, self.date, self.time)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = TaskItem::new("finish report");
        assert_eq!(task.priority, TaskPriority::Normal);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.due.is_none());
    }

    #[test]
    fn test_task_confirmation() {
        let task = TaskItem::new("finish report").with_due("tomorrow");
        assert_eq!(task.confirmation(), "✅ Added: finish report - Due: tomorrow");
        assert_eq!(TaskItem::new("x").with_due("  ").confirmation(), "✅ Added: x");
    }

    #[test]
    fn test_task_priority_ordering() {
        assert!(TaskPriority::Critical > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Normal);
        assert!(TaskPriority::Normal > TaskPriority::Low);
        assert_eq!(TaskPriority::parse_loose("URGENT"), TaskPriority::High);
        assert_eq!(TaskPriority::parse_loose("whenever"), TaskPriority::Normal);
    }

    #[test]
    fn test_task_deserializes_with_defaults() {
        let task: TaskItem = serde_json::from_str(
            r#"{"text":"call mom","created_at":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(task.priority, TaskPriority::Normal);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_unique_keys() {
        assert_ne!(TaskItem::new_key(), TaskItem::new_key());
        assert!(EventItem::new_key().starts_with("event_"));
    }

    #[test]
    fn test_event_confirmation() {
        let event = EventItem {
            title: "Dentist".into(),
            date: "2026-03-02".into(),
            time: "10:00".into(),
        };
        assert_eq!(event.confirmation(), "📅 Scheduled: Dentist on 2026-03-02 at 10:00");
    }
}
