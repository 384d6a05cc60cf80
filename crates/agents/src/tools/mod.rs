//! Tool plugins the agents and the router can invoke.
//!
//! A [`Tool`] exposes a handful of named actions over JSON arguments. The
//! [`ToolRegistry`] owns the registered tools and enforces each tool's
//! guardrails (argument count, allowed actions) before dispatching.
//!
//! Built-ins:
//! - [`CalendarTool`] -- calendar holds in the `events` namespace
//! - [`TimeTool`] -- current time, offsets and zone conversion
//! - [`KvTool`] -- key/value facts in the `generic` namespace
//! - [`DocsTool`] -- read or search text files under a guarded root
//! - [`WebSearchTool`] -- curated offline search results
//! - [`FilesystemTool`] -- list and read files under a guarded root

pub mod calendar;
pub mod docs;
pub mod fs;
pub mod kv;
pub mod time;
pub mod web;

pub use calendar::CalendarTool;
pub use docs::DocsTool;
pub use fs::FilesystemTool;
pub use kv::KvTool;
pub use time::TimeTool;
pub use web::WebSearchTool;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use buddy_common::{BuddyError, Result};
use buddy_memory::MemoryStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// One tool invocation.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub user_id: String,
    pub trace_id: String,
    pub action: String,
    /// JSON object of named arguments; `null` is treated as empty.
    pub arguments: Value,
}

impl ToolRequest {
    pub fn new(
        user_id: impl Into<String>,
        trace_id: impl Into<String>,
        action: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            trace_id: trace_id.into(),
            action: action.into(),
            arguments,
        }
    }

    pub fn arg_count(&self) -> usize {
        self.arguments.as_object().map_or(0, |m| m.len())
    }

    pub fn str_arg(&self, name: &str) -> Option<&str> {
        self.arguments
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn required_str(&self, name: &str) -> Result<&str> {
        self.str_arg(name)
            .ok_or_else(|| BuddyError::Tool(format!("missing argument '{name}'")))
    }
}

/// Successful tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool: String,
    pub action: String,
    pub output: Value,
}

impl ToolOutput {
    pub fn new(tool: &str, action: &str, output: Value) -> Self {
        Self {
            tool: tool.to_string(),
            action: action.to_string(),
            output,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Actions this tool accepts; anything else is rejected by the registry.
    fn actions(&self) -> &'static [&'static str];

    /// Upper bound on the number of named arguments.
    fn max_args(&self) -> usize {
        10
    }

    async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput>;
}

/// Registered tools, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calendar, kv, time and web; docs only when a root is configured.
    pub fn with_builtins(store: Arc<MemoryStore>, docs_root: Option<PathBuf>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CalendarTool::new(store.clone())));
        registry.register(Arc::new(TimeTool));
        registry.register(Arc::new(KvTool::new(store)));
        registry.register(Arc::new(WebSearchTool));
        if let Some(root) = docs_root {
            registry.register(Arc::new(DocsTool::new(root)));
        }
        registry
    }

    /// Adds the `fs` tool when `root` is set.
    pub fn with_files_root(mut self, root: Option<PathBuf>) -> Self {
        if let Some(root) = root {
            self.register(Arc::new(FilesystemTool::new(root)));
        }
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        info!(tool = tool.name(), "Registered tool");
        self.tools.insert(tool.name(), tool);
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// One line per tool, for prompts.
    pub fn describe(&self) -> String {
        self.names()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                format!(
                    "- {} ({}): {}",
                    tool.name(),
                    tool.actions().join(", "),
                    tool.description()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn call(&self, tool: &str, request: ToolRequest) -> Result<ToolOutput> {
        let handler = self
            .tools
            .get(tool)
            .ok_or_else(|| BuddyError::Tool(format!("unknown tool '{tool}'")))?;

        if !request.arguments.is_null() && !request.arguments.is_object() {
            return Err(BuddyError::Tool(format!(
                "arguments for '{tool}' must be a JSON object"
            )));
        }
        if request.arg_count() > handler.max_args() {
            warn!(
                tool,
                trace_id = %request.trace_id,
                args = request.arg_count(),
                max = handler.max_args(),
                "Tool call blocked by guardrail"
            );
            return Err(BuddyError::Tool(format!(
                "guardrail violation: '{tool}' accepts at most {} arguments",
                handler.max_args()
            )));
        }
        if !handler.actions().contains(&request.action.as_str()) {
            return Err(BuddyError::Tool(format!(
                "'{tool}' has no action '{}'",
                request.action
            )));
        }

        let output = handler.invoke(&request).await?;
        info!(tool, action = %request.action, trace_id = %request.trace_id, "Tool invoked");
        Ok(output)
    }
}
