//! General agent - todo list, calendar and everyday questions.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use buddy_common::{
    AgentReply, EventItem, Envelope, MemoryContext, MemoryRecord, Mode, ModeAgent, Namespace,
    Result, TaskItem,
};
use buddy_llm::LlmClient;
use chrono::Utc;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::prompt::{ask, build_request};
use crate::side_effects::{extract, user_fact};
use crate::tools::{ToolRegistry, ToolRequest};

const GENERAL_SYSTEM_PROMPT: &str = r#"You are Smart Buddy, a helpful AI assistant. You manage the user's todo list and calendar and answer everyday questions.

Be clear, friendly and brief. Use what you remember about the user when it is relevant.

When the user shares a lasting fact about themselves, add a line:
REMEMBER: <the fact>
"#;

const CALENDAR_KEYWORDS: &[&str] = &[
    "schedule",
    "calendar",
    "event",
    "appointment",
    "meeting",
    "remind me",
    "set reminder",
];
const TASK_KEYWORDS: &[&str] = &["todo", "to-do", "task", "need to do"];
const LIST_KEYWORDS: &[&str] = &["show", "list", "what", "view", "see"];
const CREATE_KEYWORDS: &[&str] = &["add", "create", "new"];

const EVENT_FALLBACK: &str = "I can help schedule that. When would you like it?";
const TASK_FALLBACK: &str = "Got it, I'll add that to your list.";
const GENERAL_FALLBACK: &str = "I'm here to help! What would you like to know?";

static TIME_QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(what time is it|what's the time|what is the time|current time)\b").unwrap()
});

static ZONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][A-Za-z_]+/[A-Z][A-Za-z_]+(?:/[A-Z][A-Za-z_]+)?|UTC)\b").unwrap());

/// What the user is asking the general agent for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum GeneralRequest {
    ListTasks,
    ListEvents,
    CurrentTime(Option<String>),
    CreateEvent,
    CreateTask,
    Chat,
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

fn classify(text: &str) -> GeneralRequest {
    let lower = text.to_lowercase();
    let calendar = contains_any(&lower, CALENDAR_KEYWORDS) || lower.contains("events");
    let task = contains_any(&lower, TASK_KEYWORDS);
    let creating = contains_any(&lower, CREATE_KEYWORDS);

    if contains_any(&lower, LIST_KEYWORDS) && !creating {
        if calendar {
            return GeneralRequest::ListEvents;
        }
        if task {
            return GeneralRequest::ListTasks;
        }
    }
    if TIME_QUESTION_RE.is_match(text) {
        let zone = ZONE_RE.captures(text).map(|c| c[1].to_string());
        return GeneralRequest::CurrentTime(zone);
    }
    if calendar {
        GeneralRequest::CreateEvent
    } else if task {
        GeneralRequest::CreateTask
    } else {
        GeneralRequest::Chat
    }
}

fn task_line(record: &MemoryRecord) -> String {
    match serde_json::from_value::<TaskItem>(record.value.clone()) {
        Ok(task) => match task.due {
            Some(due) => format!("{} (due {})", task.text, due),
            None => task.text,
        },
        Err(_) => record.index_text(),
    }
}

fn event_line(record: &MemoryRecord) -> String {
    match serde_json::from_value::<EventItem>(record.value.clone()) {
        Ok(event) if event.time.is_empty() => format!("{} - {}", event.title, event.date),
        Ok(event) => format!("{} - {} at {}", event.title, event.date, event.time),
        Err(_) => record.index_text(),
    }
}

fn numbered(lines: impl Iterator<Item = String>) -> String {
    lines
        .enumerate()
        .map(|(i, line)| format!("{}. {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Answers list requests straight from stored records and turns creation
/// requests into `tasks` / `events` upserts.
pub struct GeneralAgent {
    llm: Arc<dyn LlmClient>,
    tools: Option<Arc<ToolRegistry>>,
}

impl GeneralAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, tools: None }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    fn list_tasks(context: &MemoryContext) -> String {
        let tasks: Vec<_> = context.records_in(Namespace::Tasks).collect();
        if tasks.is_empty() {
            return "📝 Your todo list is empty right now.".into();
        }
        format!(
            "📝 Your todo list:\n\n{}",
            numbered(tasks.into_iter().map(task_line))
        )
    }

    fn list_events(context: &MemoryContext) -> String {
        let events: Vec<_> = context.records_in(Namespace::Events).collect();
        if events.is_empty() {
            return "📅 Your calendar is empty right now.".into();
        }
        format!(
            "📅 Here are your scheduled events:\n\n{}",
            numbered(events.into_iter().map(event_line))
        )
    }

    async fn current_time(&self, envelope: &Envelope, zone: Option<String>) -> Option<String> {
        let tools = self.tools.as_ref()?;
        let request = ToolRequest::new(
            &envelope.user_id,
            &envelope.trace_id,
            "now",
            zone.map_or(serde_json::Value::Null, |z| json!({ "timezone": z })),
        );
        match tools.call("time", request).await {
            Ok(out) => {
                let time = out.output["time"].as_str().unwrap_or_default();
                let zone = out.output["timezone"].as_str().unwrap_or("UTC");
                Some(format!("🕒 It's {time} ({zone})."))
            }
            Err(e) => {
                warn!(trace_id = %envelope.trace_id, error = %e, "Time tool failed");
                None
            }
        }
    }

    fn instruction(request: &GeneralRequest, text: &str) -> String {
        let today = Utc::now().date_naive();
        match request {
            GeneralRequest::CreateTask => format!(
                r#"The user wants to add something to their todo list: "{text}"
Today is {today}.

Reply with one short friendly sentence, then on its own line:
TASK_CREATED: {{"text": "<the task, without the due date>", "priority": "low|normal|high|critical", "deadline": "<when it is due, or empty>"}}"#
            ),
            GeneralRequest::CreateEvent => format!(
                r#"The user wants to put something on their calendar: "{text}"
Today is {today}.

If the date is clear, reply with one short sentence, then on its own line:
EVENT_CREATED: {{"title": "<what>", "date": "<YYYY-MM-DD or the user's wording>", "time": "<HH:MM or empty>"}}
If the date is missing, ask when it should be and do not output the marker."#
            ),
            _ => text.to_string(),
        }
    }

    fn fallback(request: &GeneralRequest) -> &'static str {
        match request {
            GeneralRequest::CreateEvent => EVENT_FALLBACK,
            GeneralRequest::CreateTask => TASK_FALLBACK,
            _ => GENERAL_FALLBACK,
        }
    }
}

#[async_trait]
impl ModeAgent for GeneralAgent {
    fn mode(&self) -> Mode {
        Mode::General
    }

    fn read_namespaces(&self) -> &'static [Namespace] {
        &[Namespace::Tasks, Namespace::Events]
    }

    fn system_prompt(&self) -> &str {
        GENERAL_SYSTEM_PROMPT
    }

    async fn handle(&self, envelope: &Envelope, context: &MemoryContext) -> Result<AgentReply> {
        let request = classify(&envelope.text);
        debug!(trace_id = %envelope.trace_id, request = ?request, "General agent request");

        let mut reply = match &request {
            GeneralRequest::ListTasks => AgentReply::new(Self::list_tasks(context)),
            GeneralRequest::ListEvents => AgentReply::new(Self::list_events(context)),
            GeneralRequest::CurrentTime(zone) => {
                match self.current_time(envelope, zone.clone()).await {
                    Some(text) => AgentReply::new(text),
                    None => return self.chat(envelope, context, &GeneralRequest::Chat).await,
                }
            }
            other => return self.chat(envelope, context, other).await,
        };

        reply.side_effects.extend(user_fact(&envelope.text));
        Ok(reply)
    }
}

impl GeneralAgent {
    async fn chat(
        &self,
        envelope: &Envelope,
        context: &MemoryContext,
        request: &GeneralRequest,
    ) -> Result<AgentReply> {
        let llm_request = build_request(
            GENERAL_SYSTEM_PROMPT,
            context,
            Self::instruction(request, &envelope.text),
        );

        let (content, tokens) = match ask(self.llm.as_ref(), llm_request).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(trace_id = %envelope.trace_id, error = %e, "General agent LLM call failed");
                return Ok(AgentReply::degraded(Self::fallback(request)));
            }
        };

        let extraction = extract(&content);
        let confirmations = extraction.confirmations();
        let text = match request {
            GeneralRequest::CreateTask | GeneralRequest::CreateEvent if !confirmations.is_empty() => {
                confirmations.join("\n")
            }
            _ if confirmations.is_empty() => extraction.reply.clone(),
            _ if extraction.reply.is_empty() => confirmations.join("\n"),
            _ => format!("{}\n\n{}", extraction.reply, confirmations.join("\n")),
        };
        let text = if text.is_empty() {
            Self::fallback(request).to_string()
        } else {
            text
        };

        let mut reply = AgentReply::new(text);
        reply.tokens = tokens;
        reply.side_effects = extraction.side_effects();
        reply.side_effects.extend(user_fact(&envelope.text));

        info!(
            trace_id = %envelope.trace_id,
            side_effects = reply.side_effects.len(),
            tokens = tokens.total(),
            "General agent replied"
        );
        Ok(reply)
    }
}
