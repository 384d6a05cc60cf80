//! Sandboxed file browsing: list directories and read files under one root.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use buddy_common::security::resolve_under_root;
use buddy_common::{BuddyError, Result};
use serde_json::{json, Value};

use super::{Tool, ToolOutput, ToolRequest};

/// Files above this size are refused rather than truncated.
const MAX_FILE_BYTES: u64 = 1_000_000;
const MAX_ENTRIES: usize = 500;

pub struct FilesystemTool {
    root: PathBuf,
}

impl FilesystemTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn list(root: &Path, relative: &str) -> Result<Value> {
        let dir = resolve_under_root(root, relative)?;
        if !dir.is_dir() {
            return Err(BuddyError::Tool(format!("'{relative}' is not a directory")));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_symlink() {
                continue;
            }
            let size = if file_type.is_file() { entry.metadata()?.len() } else { 0 };
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "type": if file_type.is_dir() { "directory" } else { "file" },
                "size": size,
            }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        let truncated = entries.len() > MAX_ENTRIES;
        entries.truncate(MAX_ENTRIES);

        Ok(json!({ "path": relative, "entries": entries, "truncated": truncated }))
    }

    fn read(root: &Path, relative: &str) -> Result<Value> {
        let path = resolve_under_root(root, relative)?;
        let meta = fs::metadata(&path)?;
        if !meta.is_file() {
            return Err(BuddyError::Tool(format!("'{relative}' is not a file")));
        }
        if meta.len() > MAX_FILE_BYTES {
            return Err(BuddyError::Tool(format!(
                "'{relative}' is {} bytes; the limit is {MAX_FILE_BYTES}",
                meta.len()
            )));
        }
        let content = fs::read_to_string(&path)?;
        Ok(json!({ "path": relative, "size": content.len(), "content": content }))
    }
}

#[async_trait]
impl Tool for FilesystemTool {
    fn name(&self) -> &'static str {
        "fs"
    }

    fn description(&self) -> &'static str {
        "List directories and read files inside the configured workspace folder"
    }

    fn actions(&self) -> &'static [&'static str] {
        &["list", "read"]
    }

    fn max_args(&self) -> usize {
        5
    }

    async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput> {
        let root = self.root.clone();
        let output = match request.action.as_str() {
            "list" => {
                let relative = request.str_arg("path").unwrap_or(".").to_string();
                tokio::task::spawn_blocking(move || Self::list(&root, &relative)).await
            }
            _ => {
                let relative = request.required_str("path")?.to_string();
                tokio::task::spawn_blocking(move || Self::read(&root, &relative)).await
            }
        }
        .map_err(|e| BuddyError::Tool(format!("fs task failed: {e}")))??;

        Ok(ToolOutput::new(self.name(), &request.action, output))
    }
}
