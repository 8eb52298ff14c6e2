//! Error types for `swagger-agent-openapi-tools`.

use swagger_agent_http_tools::runtime::HttpToolsError;
use thiserror::Error;

/// Main error type for `OpenAPI` tooling.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Configuration errors (invalid config, out-of-range values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup errors (spec directory missing, nothing compiled).
    #[error("Startup error: {0}")]
    Startup(String),

    /// `OpenAPI` errors (unsupported document, malformed operation).
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    #[error("OpenAPI error: failed to read spec file '{path}': {source}")]
    SpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OpenAPI error: failed to parse OpenAPI spec from '{location}': {source}")]
    SpecParse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// `$ref` resolution errors (dangling pointer, cycle, unreadable target).
    #[error("Reference error: {0}")]
    Reference(String),

    /// A single endpoint could not be turned into a tool.
    #[error("Tool compilation error for '{tool}': {message}")]
    ToolCompile { tool: String, message: String },

    /// Transport construction errors.
    #[error(transparent)]
    Http(#[from] HttpToolsError),
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
