//! Offline web search over a small curated result set.

use async_trait::async_trait;
use buddy_common::{BuddyError, Result};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::{Tool, ToolOutput, ToolRequest};

const MAX_HITS: usize = 3;
const MAX_QUERY_CHARS: usize = 160;

/// Tags a caller may filter on.
pub const ALLOWED_TAGS: &[&str] = &["metrics", "tools", "education"];

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CuratedResult {
    pub title: &'static str,
    pub url: &'static str,
    pub summary: &'static str,
    pub tags: &'static [&'static str],
}

const CURATED: &[CuratedResult] = &[
    CuratedResult {
        title: "AI Observability Basics",
        url: "https://example.org/observability",
        summary: "Explains latency percentiles, trace IDs, and metrics useful for agent systems.",
        tags: &["metrics", "observability"],
    },
    CuratedResult {
        title: "Tool Orchestration Blueprint",
        url: "https://example.org/tools",
        summary: "Patterns for secure tool execution, guardrails, and audit logging.",
        tags: &["tools", "security"],
    },
    CuratedResult {
        title: "Education Benchmarks 2025",
        url: "https://example.org/edu-bench",
        summary: "Latest data on AI tutor effectiveness across 50 judge scenarios.",
        tags: &["education", "benchmarks"],
    },
];

impl CuratedResult {
    fn matches(&self, query: &str, tag: Option<&str>) -> bool {
        let text_hit = query.is_empty()
            || self.title.to_lowercase().contains(query)
            || self.summary.to_lowercase().contains(query);
        text_hit && tag.is_none_or(|t| self.tags.contains(&t))
    }
}

/// Never touches the network; results come from [`CURATED`].
pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web"
    }

    fn description(&self) -> &'static str {
        "Search a curated offline index of reference articles"
    }

    fn actions(&self) -> &'static [&'static str] {
        &["search"]
    }

    fn max_args(&self) -> usize {
        4
    }

    async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput> {
        let query = request.str_arg("query").unwrap_or_default().to_lowercase();
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(BuddyError::Tool(format!(
                "query longer than {MAX_QUERY_CHARS} characters"
            )));
        }
        let tag = request.str_arg("tag").map(str::to_lowercase);
        if let Some(tag) = tag.as_deref().filter(|t| !ALLOWED_TAGS.contains(t)) {
            return Err(BuddyError::Tool(format!("tag '{tag}' is not allowed")));
        }

        let hits: Vec<&CuratedResult> = CURATED
            .iter()
            .filter(|r| r.matches(&query, tag.as_deref()))
            .take(MAX_HITS)
            .collect();
        debug!(%query, ?tag, hits = hits.len(), "Curated web search");

        Ok(ToolOutput::new(
            self.name(),
            &request.action,
            json!({ "query": query, "tag": tag, "hits": hits }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn search(args: serde_json::Value) -> Result<ToolOutput> {
        WebSearchTool
            .invoke(&ToolRequest::new("u1", "t", "search", args))
            .await
    }

    #[tokio::test]
    async fn test_query_matches_title_or_summary() {
        let out = search(json!({"query": "GUARDRAILS"})).await.unwrap();
        let hits = out.output["hits"].as_array().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["title"], "Tool Orchestration Blueprint");
        assert_eq!(hits[0]["url"], "https://example.org/tools");
        assert!(hits[0]["summary"].is_string());
    }

    #[tokio::test]
    async fn test_tag_filter() {
        let out = search(json!({"tag": "education"})).await.unwrap();
        let hits = out.output["hits"].as_array().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["title"], "Education Benchmarks 2025");

        let none = search(json!({"query": "latency", "tag": "tools"})).await.unwrap();
        assert!(none.output["hits"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unlisted_tag_rejected() {
        let err = search(json!({"tag": "security"})).await.unwrap_err();
        assert!(matches!(err, BuddyError::Tool(msg) if msg.contains("not allowed")));
    }

    #[tokio::test]
    async fn test_empty_query_caps_hits() {
        let out = search(serde_json::Value::Null).await.unwrap();
        assert_eq!(out.output["hits"].as_array().unwrap().len(), MAX_HITS);
    }
}
