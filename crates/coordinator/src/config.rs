//! `buddy.toml`: one table per subsystem, every table optional.

use std::path::{Path, PathBuf};

use anyhow::Context;
use buddy_llm::{LlmConfig, Provider};
use buddy_memory::MemoryConfig;
use buddy_observability::ObservabilityConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Top-level configuration, one TOML table per subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuddyConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Root for the `docs` tool; the tool is not registered when unset.
    #[serde(default)]
    pub docs_root: Option<PathBuf>,

    /// Root for the `fs` tool; unset keeps it unregistered.
    #[serde(default)]
    pub files_root: Option<PathBuf>,
}

impl BuddyConfig {
    /// Load a TOML file, refusing unsafe permissions on Unix, then fill
    /// missing API keys from the environment.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;

        #[cfg(unix)]
        check_permissions(path, holds_api_key(&content))?;

        let config = Self::parse(&content)?;
        if config.llm.api_key.is_some() || config.memory.embedding_api_key.is_some() {
            warn!(
                path = %path.display(),
                "Config file stores an API key; prefer OPENAI_API_KEY / GOOGLE_API_KEY"
            );
        }
        Ok(config)
    }

    /// Same as [`from_file`](Self::from_file) without the permission check.
    pub fn from_file_unchecked(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(content).context("parsing config")?;
        config.resolve_api_keys();
        Ok(config)
    }

    /// Fill unset keys: `OPENAI_API_KEY` for openai, `GOOGLE_API_KEY` for
    /// gemini. Embeddings only take a key from the environment when they use
    /// the openai provider.
    pub fn resolve_api_keys(&mut self) {
        fn unset(key: &Option<String>) -> bool {
            key.as_deref().is_none_or(str::is_empty)
        }

        if unset(&self.llm.api_key) {
            self.llm.api_key = self.llm.provider().ok().and_then(env_key);
        }
        if self.memory.embedding_provider == "openai" && unset(&self.memory.embedding_api_key) {
            self.memory.embedding_api_key = env_key(Provider::OpenAi);
        }
    }
}

fn env_key(provider: Provider) -> Option<String> {
    let var = match provider {
        Provider::OpenAi => "OPENAI_API_KEY",
        Provider::Gemini => "GOOGLE_API_KEY",
    };
    std::env::var(var).ok().filter(|k| !k.is_empty())
}

/// Any uncommented `api_key = ...` assignment.
fn holds_api_key(content: &str) -> bool {
    content
        .lines()
        .map(str::trim_start)
        .filter(|line| !line.starts_with('#'))
        .any(|line| line.contains("api_key") && line.contains('='))
}

/// Regular file only, never world-writable, and never world-readable when
/// it holds a key. Group-readable keys only warn.
#[cfg(unix)]
fn check_permissions(path: &Path, has_key: bool) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let meta = std::fs::symlink_metadata(path)
        .with_context(|| format!("inspecting config {}", path.display()))?;
    if !meta.is_file() {
        anyhow::bail!("config path {} is not a regular file", path.display());
    }

    let mode = meta.permissions().mode() & 0o777;
    let shown = path.display();
    if mode & 0o002 != 0 {
        anyhow::bail!("config {shown} is world-writable (mode {mode:04o}); run chmod o-w {shown}");
    }
    if has_key && mode & 0o004 != 0 {
        anyhow::bail!(
            "config {shown} holds an API key and is world-readable (mode {mode:04o}); run chmod 600 {shown}"
        );
    }
    if has_key && mode & 0o040 != 0 {
        warn!(path = %shown, mode = format!("{mode:04o}"), "Config with API key is group-readable");
    }
    Ok(())
}
