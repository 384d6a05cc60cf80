//! Calendar holds stored as [`EventItem`]s in the `events` namespace.

use std::sync::Arc;

use async_trait::async_trait;
use buddy_common::{EventItem, Namespace, Result};
use buddy_memory::MemoryStore;
use chrono::{Duration, Utc};
use serde_json::json;

use super::{Tool, ToolOutput, ToolRequest};

const UPCOMING_LIMIT: usize = 3;
const MAX_TITLE_CHARS: usize = 80;

pub struct CalendarTool {
    store: Arc<MemoryStore>,
}

impl CalendarTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    async fn add_hold(&self, request: &ToolRequest) -> Result<ToolOutput> {
        let title: String = request
            .str_arg("title")
            .unwrap_or("Hold")
            .chars()
            .take(MAX_TITLE_CHARS)
            .collect();
        // Holds without a date land on tomorrow.
        let date = request
            .str_arg("date")
            .map(str::to_string)
            .unwrap_or_else(|| (Utc::now() + Duration::days(1)).date_naive().to_string());
        let event = EventItem {
            title,
            date,
            time: request.str_arg("time").unwrap_or("09:00").to_string(),
        };

        let key = EventItem::new_key();
        self.store
            .upsert(
                Namespace::Events,
                &request.user_id,
                &key,
                serde_json::to_value(&event)?,
            )
            .await?;

        Ok(ToolOutput::new(
            self.name(),
            "add_hold",
            json!({ "key": key, "created": event, "confirmation": event.confirmation() }),
        ))
    }

    async fn list_upcoming(&self, request: &ToolRequest) -> Result<ToolOutput> {
        let records = self.store.list(Namespace::Events, &request.user_id).await?;
        let upcoming: Vec<_> = records
            .iter()
            .rev()
            .take(UPCOMING_LIMIT)
            .map(|r| r.value.clone())
            .collect();
        Ok(ToolOutput::new(
            self.name(),
            "list_upcoming",
            json!({ "events": upcoming, "total": records.len() }),
        ))
    }
}

#[async_trait]
impl Tool for CalendarTool {
    fn name(&self) -> &'static str {
        "calendar"
    }

    fn description(&self) -> &'static str {
        "Create calendar holds or list the latest events"
    }

    fn actions(&self) -> &'static [&'static str] {
        &["add_hold", "list_upcoming"]
    }

    fn max_args(&self) -> usize {
        6
    }

    async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput> {
        match request.action.as_str() {
            "add_hold" => self.add_hold(request).await,
            _ => self.list_upcoming(request).await,
        }
    }
}
