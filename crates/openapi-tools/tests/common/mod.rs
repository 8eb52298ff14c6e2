#![allow(dead_code)]

use anyhow::Context as _;
use std::path::Path;
use swagger_agent_openapi_tools::config::SecurityConfig;
use swagger_agent_openapi_tools::{AgentConfig, ToolRegistry};

/// Write `content` to `dir/name`.
pub fn write_spec(dir: &Path, name: &str, content: &str) -> anyhow::Result<()> {
    std::fs::write(dir.join(name), content).with_context(|| format!("write {name}"))
}

pub fn agent_config(dir: &Path, security: SecurityConfig) -> AgentConfig {
    AgentConfig {
        specs_directory: dir.to_path_buf(),
        security,
        ..AgentConfig::default()
    }
}

/// Eagerly compiled registry over `dir`.
pub async fn start_registry(dir: &Path, security: SecurityConfig) -> anyhow::Result<ToolRegistry> {
    ToolRegistry::start(agent_config(dir, security))
        .await
        .context("start tool registry")
}
