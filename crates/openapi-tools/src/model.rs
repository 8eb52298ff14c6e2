//! Normalized, self-contained view of the operations declared in an `OpenAPI` document.
//!
//! An [`Endpoint`] is built once by the extractor and never mutated. All `$ref`s for parameters,
//! request bodies, responses, headers and examples are already resolved; schemas are kept as
//! [`SchemaSource`] so they can be expanded later against the document they came from.

use crate::resolver::DocId;
use indexmap::IndexMap;
use openapiv3::{ReferenceOr, Schema};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

impl ParamLocation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
        }
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub description: Option<String>,
    pub required: bool,
    /// Primitive type name as declared (`string` when unknown).
    pub param_type: String,
    pub format: Option<String>,
    pub default: Option<Value>,
    /// Allowed values, stringified.
    pub enum_values: Vec<String>,
    pub items: Option<ItemsDescriptor>,
}

/// Element type of an array parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemsDescriptor {
    pub item_type: String,
    pub format: Option<String>,
}

/// A schema together with the document it was declared in, so relative `$ref`s inside it
/// resolve against the right file.
#[derive(Debug, Clone)]
pub struct SchemaSource {
    pub doc: DocId,
    pub schema: ReferenceOr<Schema>,
}

#[derive(Debug, Clone, Default)]
pub struct MediaTypeSpec {
    pub schema: Option<SchemaSource>,
    pub example: Option<Value>,
    pub examples: IndexMap<String, ExampleSpec>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExampleSpec {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestBodySpec {
    pub description: Option<String>,
    pub required: bool,
    pub content: IndexMap<String, MediaTypeSpec>,
}

impl RequestBodySpec {
    /// Media type used for schema compilation: `application/json`, then any other JSON-ish
    /// type, then whatever is declared first.
    #[must_use]
    pub fn preferred_media_type(&self) -> Option<(&str, &MediaTypeSpec)> {
        let essence = |k: &str| {
            k.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        };

        self.content
            .iter()
            .find(|(k, _)| essence(k) == "application/json")
            .or_else(|| self.content.iter().find(|(k, _)| essence(k).contains("json")))
            .or_else(|| self.content.first())
            .map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseSpec {
    pub description: String,
    pub content: IndexMap<String, MediaTypeSpec>,
    pub headers: IndexMap<String, HeaderSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSpec {
    pub description: Option<String>,
}

/// One HTTP operation of one document.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub operation_id: String,
    pub method: Method,
    /// Path template, always starting with `/`.
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub base_url: String,
    pub project_id: String,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBodySpec>,
    /// Keyed by status code string: `"200"`, `"2XX"`, `"default"`.
    pub responses: IndexMap<String, ResponseSpec>,
    pub tags: Vec<String>,
}

impl Endpoint {
    /// First tag without a trailing `controller` suffix, or `general`.
    #[must_use]
    pub fn controller(&self) -> String {
        self.tags
            .first()
            .map(|tag| strip_controller_suffix(tag))
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "general".to_string())
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Parameters except the injected security headers.
    pub fn visible_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(|p| !crate::config::is_security_name(&p.name))
    }
}

fn strip_controller_suffix(tag: &str) -> String {
    let trimmed = tag.trim();
    let lower = trimmed.to_ascii_lowercase();
    let Some(stem_len) = lower.strip_suffix("controller").map(str::len) else {
        return trimmed.to_string();
    };
    trimmed[..stem_len]
        .trim_end_matches(['-', '_', ' '])
        .to_string()
}

/// Non-fatal problem found while loading or compiling; the affected item was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// File, endpoint or tool the problem belongs to.
    pub source: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}
