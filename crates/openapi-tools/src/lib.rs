//! Compile `OpenAPI` 3 documents into callable HTTP tools.
//!
//! Specs are loaded from a directory ([`loader`]), their operations extracted into
//! [`model::Endpoint`]s ([`extract`], with `$ref`s handled by [`resolver`]) and each endpoint
//! compiled into a [`tool::Tool`]: a unique name ([`naming`]), a flat input schema ([`schema`]),
//! prose for the caller ([`description`]) and a request executor ([`executor`]).
//! [`registry::ToolRegistry`] runs that pass once and hands out the result.

pub mod config;
pub mod description;
pub mod error;
pub mod executor;
pub mod extract;
pub mod loader;
pub mod model;
pub mod naming;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod tool;

pub use config::AgentConfig;
pub use error::{OpenApiToolsError, Result};
pub use executor::ToolExecutionResult;
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolSet};
