//! Read-only lookup over text documents under a configured root.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use buddy_common::security::resolve_under_root;
use buddy_common::{BuddyError, Result};
use serde_json::{json, Value};
use tracing::debug;

use super::{Tool, ToolOutput, ToolRequest};

const MAX_QUERY_CHARS: usize = 160;
const MAX_READ_BYTES: usize = 64 * 1024;
const MAX_HITS: usize = 3;
const MAX_FILES_SCANNED: usize = 200;
const EXCERPT_CHARS: usize = 240;
const DOC_EXTENSIONS: &[&str] = &["md", "txt"];

pub struct DocsTool {
    root: PathBuf,
}

impl DocsTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn read(root: &Path, relative: &str) -> Result<Value> {
        let path = resolve_under_root(root, relative)?;
        if !path.is_file() {
            return Err(BuddyError::Tool(format!("'{relative}' is not a file")));
        }
        let content = fs::read_to_string(&path)?;
        let truncated = content.len() > MAX_READ_BYTES;
        let mut end = content.len().min(MAX_READ_BYTES);
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        Ok(json!({
            "path": relative,
            "content": &content[..end],
            "truncated": truncated,
        }))
    }

    fn search(root: &Path, query: &str) -> Result<Value> {
        let needle = query.to_lowercase();
        let mut files = Vec::new();
        collect_docs(root, &mut files)?;
        files.sort();

        let mut hits = Vec::new();
        for path in files.iter().take(MAX_FILES_SCANNED) {
            let Ok(content) = fs::read_to_string(path) else {
                continue;
            };
            let flattened = content.split_whitespace().collect::<Vec<_>>().join(" ");
            if !flattened.to_lowercase().contains(&needle) {
                continue;
            }
            let title = path
                .file_stem()
                .map(|s| s.to_string_lossy().replace('_', " "))
                .unwrap_or_default();
            let relative = path.strip_prefix(root).unwrap_or(path);
            hits.push(json!({
                "title": title,
                "path": relative.to_string_lossy(),
                "excerpt": flattened.chars().take(EXCERPT_CHARS).collect::<String>(),
            }));
            if hits.len() >= MAX_HITS {
                break;
            }
        }

        debug!(query, hits = hits.len(), scanned = files.len(), "Searched documents");
        Ok(json!({ "query": query, "hits": hits }))
    }
}

fn collect_docs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        // symlinks are skipped so the walk never leaves the root
        if file_type.is_dir() {
            collect_docs(&path, out)?;
        } else if file_type.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| DOC_EXTENSIONS.contains(&e))
        {
            out.push(path);
        }
    }
    Ok(())
}

#[async_trait]
impl Tool for DocsTool {
    fn name(&self) -> &'static str {
        "docs"
    }

    fn description(&self) -> &'static str {
        "Read or keyword-search local reference documents"
    }

    fn actions(&self) -> &'static [&'static str] {
        &["read", "search"]
    }

    fn max_args(&self) -> usize {
        4
    }

    async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput> {
        let root = self.root.clone();
        let output = match request.action.as_str() {
            "read" => {
                let relative = request.required_str("path")?.to_string();
                tokio::task::spawn_blocking(move || Self::read(&root, &relative)).await
            }
            _ => {
                let query = request.required_str("query")?.to_string();
                if query.chars().count() > MAX_QUERY_CHARS {
                    return Err(BuddyError::Tool(format!(
                        "query longer than {MAX_QUERY_CHARS} characters"
                    )));
                }
                tokio::task::spawn_blocking(move || Self::search(&root, &query)).await
            }
        }
        .map_err(|e| BuddyError::Tool(format!("docs task failed: {e}")))??;

        Ok(ToolOutput::new(self.name(), &request.action, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("getting_started.md"), "# Start\nInstall the buddy and say hello.").unwrap();
        fs::create_dir(dir.path().join("guides")).unwrap();
        fs::write(dir.path().join("guides/tasks.txt"), "Tasks can have a due date.").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_read_file() {
        let dir = docs_dir();
        let tool = DocsTool::new(dir.path().to_path_buf());
        let out = tool
            .invoke(&ToolRequest::new("u1", "t", "read", json!({"path": "guides/tasks.txt"})))
            .await
            .unwrap();
        assert_eq!(out.output["content"], "Tasks can have a due date.");
        assert_eq!(out.output["truncated"], false);
    }

    #[tokio::test]
    async fn test_read_outside_root_rejected() {
        let dir = docs_dir();
        let tool = DocsTool::new(dir.path().to_path_buf());
        let err = tool
            .invoke(&ToolRequest::new("u1", "t", "read", json!({"path": "../etc/passwd"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "tool_error");
    }

    #[tokio::test]
    async fn test_search_finds_case_insensitive() {
        let dir = docs_dir();
        let tool = DocsTool::new(dir.path().to_path_buf());
        let out = tool
            .invoke(&ToolRequest::new("u1", "t", "search", json!({"query": "DUE DATE"})))
            .await
            .unwrap();
        let hits = out.output["hits"].as_array().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["title"], "tasks");
    }

    #[tokio::test]
    async fn test_search_query_length_guard() {
        let dir = docs_dir();
        let tool = DocsTool::new(dir.path().to_path_buf());
        let long = "x".repeat(MAX_QUERY_CHARS + 1);
        assert!(tool
            .invoke(&ToolRequest::new("u1", "t", "search", json!({"query": long})))
            .await
            .is_err());
    }
}
