//! HTTP plumbing for swagger-agent tools.
//!
//! Holds the pieces of outbound HTTP that do not depend on `OpenAPI`: the bounded transport,
//! error redaction and method semantics. `swagger-agent-openapi-tools` builds requests and hands
//! them to [`runtime::HttpTransport`].

pub mod config;
pub mod runtime;
pub mod safety;
pub mod semantics;
