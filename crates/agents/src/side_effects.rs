//! Best-effort extraction of persistence intents from LLM replies and user
//! messages.
//!
//! Recognised markers, one per line:
//!
//! ```text
//! TASK_CREATED: {"text": "...", "priority": "high", "deadline": "friday"}
//! EVENT_CREATED: {"title": "...", "date": "...", "time": "..."}
//! REMEMBER: free text to index
//! TOOL_CALL: {"tool": "kv", "action": "set", "arguments": {...}}
//! create task: finish report [due tomorrow]
//! ```
//!
//! Malformed payloads are dropped silently. Every recognised line is removed
//! from the user-facing reply.

use std::sync::LazyLock;

use buddy_common::{EventItem, Namespace, SideEffect, TaskItem, TaskPriority};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)\b(TASK_CREATED|EVENT_CREATED|REMEMBER|TOOL_CALL):[ \t]*(.*)$").unwrap()
});

static CREATE_TASK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:[-*][ \t]*)?create task:[ \t]*(.+?)(?:[ \t]*\[?[ \t]*due:?[ \t]+([^\]\n]+?)\]?)?[ \t]*$",
    )
    .unwrap()
});

static REMEMBER_FACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:please\s+)?remember\s+(?:that\s+)?(.+?)[.!\s]*$").unwrap()
});

static MY_FACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bmy\s+([a-z][a-z' ]{0,40}?)\s+(is|are)\s+([^?.!\n]+)").unwrap()
});

const QUESTION_WORDS: &[&str] = &["what", "who", "where", "when", "why", "how", "which", "do", "does", "is", "are"];

/// Items pulled out of one LLM reply.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Reply with marker lines removed.
    pub reply: String,
    pub tasks: Vec<TaskItem>,
    pub events: Vec<EventItem>,
    pub remembered: Vec<String>,
    pub tool_calls: Vec<SideEffect>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
            && self.events.is_empty()
            && self.remembered.is_empty()
            && self.tool_calls.is_empty()
    }

    /// Confirmation lines for created tasks and events, in extraction order.
    pub fn confirmations(&self) -> Vec<String> {
        self.tasks
            .iter()
            .map(TaskItem::confirmation)
            .chain(self.events.iter().map(EventItem::confirmation))
            .collect()
    }

    pub fn side_effects(&self) -> Vec<SideEffect> {
        let tasks = self.tasks.iter().filter_map(|task| {
            serde_json::to_value(task).ok().map(|value| SideEffect::Upsert {
                namespace: Namespace::Tasks,
                key: TaskItem::new_key(),
                value,
            })
        });
        let events = self.events.iter().filter_map(|event| {
            serde_json::to_value(event).ok().map(|value| SideEffect::Upsert {
                namespace: Namespace::Events,
                key: EventItem::new_key(),
                value,
            })
        });
        let remembered = self
            .remembered
            .iter()
            .map(|text| SideEffect::Remember { text: text.clone() });

        tasks
            .chain(events)
            .chain(remembered)
            .chain(self.tool_calls.iter().cloned())
            .collect()
    }
}

/// Pull markers out of `reply`.
pub fn extract(reply: &str) -> Extraction {
    let mut out = Extraction::default();

    for caps in MARKER_RE.captures_iter(reply) {
        let payload = caps[2].trim();
        match &caps[1] {
            "TASK_CREATED" => out.tasks.extend(parse_json(payload).and_then(|v| task_from_json(&v))),
            "EVENT_CREATED" => out.events.extend(parse_json(payload).and_then(|v| event_from_json(&v))),
            "TOOL_CALL" => out.tool_calls.extend(parse_json(payload).and_then(|v| tool_call_from_json(&v))),
            "REMEMBER" if !payload.is_empty() => out.remembered.push(payload.to_string()),
            _ => {}
        }
    }

    for caps in CREATE_TASK_RE.captures_iter(reply) {
        let text = caps[1].trim().trim_end_matches('.');
        if text.is_empty() {
            continue;
        }
        let mut task = TaskItem::new(text);
        if let Some(due) = caps.get(2) {
            task = task.with_due(due.as_str());
        }
        out.tasks.push(task);
    }

    let stripped = MARKER_RE.replace_all(reply, "");
    let stripped = CREATE_TASK_RE.replace_all(&stripped, "");
    out.reply = tidy(&stripped);

    if !out.is_empty() {
        debug!(
            tasks = out.tasks.len(),
            events = out.events.len(),
            remembered = out.remembered.len(),
            tool_calls = out.tool_calls.len(),
            "Extracted side effects"
        );
    }
    out
}

/// A `Remember` effect for facts the user states about themselves, e.g.
/// "remember that I'm vegetarian" or "my favorite color is blue".
/// Questions never match.
pub fn user_fact(text: &str) -> Option<SideEffect> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.ends_with('?') {
        return None;
    }
    let first_word = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if QUESTION_WORDS.contains(&first_word.as_str()) {
        return None;
    }

    if let Some(caps) = REMEMBER_FACT_RE.captures(trimmed) {
        let fact = caps[1].trim();
        // "remember to ..." is a task request, not a fact
        if fact.is_empty() || fact.to_lowercase().starts_with("to ") {
            return None;
        }
        return Some(SideEffect::Remember {
            text: fact.to_string(),
        });
    }

    MY_FACT_RE.captures(trimmed).map(|caps| SideEffect::Remember {
        text: format!(
            "my {} {} {}",
            caps[1].trim().to_lowercase(),
            caps[2].to_lowercase(),
            caps[3].trim()
        ),
    })
}

fn parse_json(payload: &str) -> Option<Value> {
    let payload = payload.trim().trim_matches('`').trim();
    serde_json::from_str(payload).ok()
}

fn non_empty_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn task_from_json(value: &Value) -> Option<TaskItem> {
    let text = non_empty_str(value, "text")?;
    let mut task = TaskItem::new(text);
    if let Some(due) = non_empty_str(value, "due").or_else(|| non_empty_str(value, "deadline")) {
        task = task.with_due(due);
    }
    if let Some(priority) = non_empty_str(value, "priority") {
        task = task.with_priority(TaskPriority::parse_loose(priority));
    }
    Some(task)
}

fn event_from_json(value: &Value) -> Option<EventItem> {
    Some(EventItem {
        title: non_empty_str(value, "title")?.to_string(),
        date: non_empty_str(value, "date")?.to_string(),
        time: non_empty_str(value, "time").unwrap_or_default().to_string(),
    })
}

fn tool_call_from_json(value: &Value) -> Option<SideEffect> {
    Some(SideEffect::ToolCall {
        tool: non_empty_str(value, "tool")?.to_string(),
        action: non_empty_str(value, "action")?.to_string(),
        arguments: value.get("arguments").cloned().unwrap_or(Value::Null),
    })
}

/// Trim trailing whitespace per line and collapse runs of blank lines.
fn tidy(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() && lines.last().is_some_and(|l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}
