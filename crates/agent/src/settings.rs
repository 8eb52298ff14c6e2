use anyhow::Context as _;
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use swagger_agent_openapi_tools::AgentConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Flags shared by every subcommand. Flags and environment variables win over the config file.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// YAML or JSON config file
    #[arg(short, long, global = true, env = "SWAGGER_AGENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory scanned for OpenAPI specs
    #[arg(long, global = true, env = "SWAGGER_AGENT_SPECS_DIR")]
    pub specs_dir: Option<PathBuf>,

    /// Bearer token sent as `Authorization` on every call
    #[arg(long, global = true, env = "SWAGGER_AGENT_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Value sent as `Traffic-Code` on every call
    #[arg(long, global = true, env = "SWAGGER_AGENT_TRAFFIC_CODE", hide_env_values = true)]
    pub traffic_code: Option<String>,

    /// Base URL for specs that declare no server
    #[arg(long, global = true, env = "SWAGGER_AGENT_FALLBACK_URL")]
    pub fallback_url: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl GlobalArgs {
    pub fn agent_config(&self) -> anyhow::Result<AgentConfig> {
        let mut cfg = match &self.config {
            Some(path) => AgentConfig::load(path)
                .with_context(|| format!("load config {}", path.display()))?,
            None => AgentConfig::default(),
        };

        if let Some(dir) = &self.specs_dir {
            cfg.specs_directory.clone_from(dir);
        }
        if let Some(url) = &self.fallback_url {
            cfg.default_fallback_url.clone_from(url);
        }
        if self.auth_token.is_some() {
            cfg.security.authorization_token.clone_from(&self.auth_token);
        }
        if self.traffic_code.is_some() {
            cfg.security.traffic_code.clone_from(&self.traffic_code);
        }
        Ok(cfg)
    }
}
