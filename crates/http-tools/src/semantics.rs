//! HTTP method semantics shared by schema compilation and request execution.
//!
//! Two questions are answered here: whether a method sends a request body for generated tools,
//! and which MCP `ToolAnnotations` describe a tool backed by that method (RFC 9110 safety and
//! idempotency).

use reqwest::Method;
use rmcp::model::ToolAnnotations;

/// Methods whose generated tools send the leftover arguments as a JSON body.
#[must_use]
pub fn method_carries_body(method: &Method) -> bool {
    matches!(method.as_str(), "POST" | "PUT" | "PATCH")
}

/// MCP tool annotations derived from HTTP method semantics.
///
/// `openWorldHint` is always `true`: every generated tool talks to an external API. Extension
/// methods only get `openWorldHint`.
#[must_use]
pub fn annotations_for_method(method: &Method) -> ToolAnnotations {
    let (read_only, destructive, idempotent) = match method.as_str() {
        "GET" | "HEAD" | "OPTIONS" | "TRACE" => (Some(true), Some(false), Some(true)),
        "POST" => (Some(false), Some(false), Some(false)),
        "PUT" | "DELETE" => (Some(false), Some(true), Some(true)),
        // PATCH may or may not be idempotent.
        "PATCH" => (Some(false), Some(true), None),
        _ => (None, None, None),
    };

    ToolAnnotations {
        title: None,
        read_only_hint: read_only,
        destructive_hint: destructive,
        idempotent_hint: idempotent,
        open_world_hint: Some(true),
    }
}
