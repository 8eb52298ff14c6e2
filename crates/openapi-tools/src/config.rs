use crate::error::{OpenApiToolsError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use swagger_agent_http_tools::config::TransportConfig;

/// Header carrying the configured bearer token.
pub const AUTHORIZATION_HEADER: &str = "Authorization";
/// Header carrying the configured traffic code.
pub const TRAFFIC_CODE_HEADER: &str = "Traffic-Code";

/// Names that are injected from configuration and never exposed to callers.
pub const SECURITY_HEADER_NAMES: [&str; 2] = [AUTHORIZATION_HEADER, TRAFFIC_CODE_HEADER];

/// Case-insensitive check against [`SECURITY_HEADER_NAMES`].
#[must_use]
pub fn is_security_name(name: &str) -> bool {
    SECURITY_HEADER_NAMES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(name))
}

/// Top-level configuration for the tool engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Root directory scanned recursively for `.json`, `.yaml` and `.yml` specs.
    #[serde(default = "default_specs_directory")]
    pub specs_directory: PathBuf,

    /// Upper bound for generated tool names.
    #[serde(default = "default_max_tool_name_length")]
    pub max_tool_name_length: usize,

    /// Base URL used for documents that declare no usable server.
    #[serde(default = "default_fallback_url")]
    pub default_fallback_url: String,

    /// Compile tools on first access instead of at startup.
    #[serde(default)]
    pub lazy_loading: bool,

    /// Credentials injected into every outbound call.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Outbound connection pool and timeouts.
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Smallest accepted `maxToolNameLength`; leaves room for a `_N` suffix after truncation.
pub const MIN_TOOL_NAME_LENGTH: usize = 8;

fn default_specs_directory() -> PathBuf {
    PathBuf::from("openapi-specs")
}

fn default_max_tool_name_length() -> usize {
    64
}

fn default_fallback_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            specs_directory: default_specs_directory(),
            max_tool_name_length: default_max_tool_name_length(),
            default_fallback_url: default_fallback_url(),
            lazy_loading: false,
            security: SecurityConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a YAML (or JSON) file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the result fails
    /// [`AgentConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|source| OpenApiToolsError::SpecReadFile {
                path: path.display().to_string(),
                source,
            })?;
        let cfg: Self = serde_yaml::from_str(&content).map_err(|e| {
            OpenApiToolsError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::Config`] for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if self.max_tool_name_length < MIN_TOOL_NAME_LENGTH {
            return Err(OpenApiToolsError::Config(format!(
                "maxToolNameLength must be at least {MIN_TOOL_NAME_LENGTH} (got {})",
                self.max_tool_name_length
            )));
        }
        if self.transport.max_connections == 0 {
            return Err(OpenApiToolsError::Config(
                "transport.maxConnections must be greater than zero".to_string(),
            ));
        }
        if self.default_fallback_url.trim().is_empty() {
            return Err(OpenApiToolsError::Config(
                "defaultFallbackUrl must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-level credentials. Blank values are treated as absent.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Sent as `Authorization: Bearer <token>`.
    #[serde(default)]
    pub authorization_token: Option<String>,

    /// Sent as `Traffic-Code: <code>`.
    #[serde(default)]
    pub traffic_code: Option<String>,
}

impl SecurityConfig {
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        non_blank(self.authorization_token.as_deref())
    }

    #[must_use]
    pub fn traffic_code(&self) -> Option<&str> {
        non_blank(self.traffic_code.as_deref())
    }
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}
