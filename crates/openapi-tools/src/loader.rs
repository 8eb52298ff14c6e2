//! Spec discovery and loading.
//!
//! A spec directory is scanned recursively for `.json`, `.yaml` and `.yml` files in sorted order.
//! Each file becomes a [`SpecDocument`]: the normalized JSON tree, a resolver rooted at it and
//! the endpoints extracted from it. Files that fail to load are logged and skipped.

use crate::error::{OpenApiToolsError, Result};
use crate::extract::EndpointExtractor;
use crate::model::{Diagnostic, Endpoint};
use crate::resolver::{DocId, OpenApiResolver};
use indexmap::IndexMap;
use openapiv3::{Info, Server};
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

const SPEC_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// One loaded `OpenAPI` document and everything extracted from it.
#[derive(Debug)]
pub struct SpecDocument {
    pub project_id: String,
    pub title: Option<String>,
    pub version: String,
    /// File the document was read from, or a display name for in-memory documents.
    pub source: String,
    pub base_url: String,
    pub resolver: OpenApiResolver,
    pub endpoints: Vec<Arc<Endpoint>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Loaded documents keyed by project identifier, in load order.
///
/// Documents that share a title share a project entry; their endpoints are all kept.
#[derive(Debug, Clone, Default)]
pub struct DocumentCache {
    inner: Arc<RwLock<IndexMap<String, Vec<Arc<SpecDocument>>>>>,
}

impl DocumentCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, doc: Arc<SpecDocument>) {
        let mut map = self.inner.write();
        let entry = map.entry(doc.project_id.clone()).or_default();
        if let Some(existing) = entry.first() {
            tracing::warn!(
                project = %doc.project_id,
                "'{}' declares the same project as '{}'",
                doc.source,
                existing.source
            );
        }
        entry.push(doc);
    }

    /// First document loaded for a project.
    #[must_use]
    pub fn get(&self, project_id: &str) -> Option<Arc<SpecDocument>> {
        self.inner
            .read()
            .get(project_id)
            .and_then(|docs| docs.first().cloned())
    }

    #[must_use]
    pub fn project_documents(&self, project_id: &str) -> Vec<Arc<SpecDocument>> {
        self.inner
            .read()
            .get(project_id)
            .cloned()
            .unwrap_or_default()
    }

    /// All documents in load order.
    #[must_use]
    pub fn documents(&self) -> Vec<Arc<SpecDocument>> {
        self.inner.read().values().flatten().cloned().collect()
    }

    #[must_use]
    pub fn project_ids(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.inner
            .read()
            .values()
            .flatten()
            .map(|d| d.endpoints.len())
            .sum()
    }
}

#[derive(Debug)]
pub struct LoadedSpecs {
    pub cache: DocumentCache,
    /// Files that were skipped, plus per-endpoint problems from the files that loaded.
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub struct SpecLoader {
    fallback_url: String,
}

impl SpecLoader {
    #[must_use]
    pub fn new(fallback_url: impl Into<String>) -> Self {
        Self {
            fallback_url: fallback_url.into(),
        }
    }

    /// Load every spec file under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::Startup`] if `dir` is missing or not a readable directory.
    /// Individual files that fail are reported in [`LoadedSpecs::diagnostics`] instead.
    pub fn load_directory(&self, dir: &Path) -> Result<LoadedSpecs> {
        let meta = std::fs::metadata(dir).map_err(|e| {
            OpenApiToolsError::Startup(format!(
                "spec directory '{}' is not accessible: {e}",
                dir.display()
            ))
        })?;
        if !meta.is_dir() {
            return Err(OpenApiToolsError::Startup(format!(
                "spec directory '{}' is not a directory",
                dir.display()
            )));
        }

        let files = discover_spec_files(dir)?;
        tracing::info!(dir = %dir.display(), files = files.len(), "Discovered spec files");

        let cache = DocumentCache::new();
        let mut diagnostics = Vec::new();
        for file in files {
            match self.load_file(&file) {
                Ok(doc) => {
                    tracing::info!(
                        project = %doc.project_id,
                        file = %file.display(),
                        endpoints = doc.endpoints.len(),
                        "Loaded spec"
                    );
                    diagnostics.extend(doc.diagnostics.iter().cloned());
                    cache.put(Arc::new(doc));
                }
                Err(e) => {
                    tracing::warn!(file = %file.display(), "Skipping spec file: {e}");
                    diagnostics.push(Diagnostic::new(file.display().to_string(), e.to_string()));
                }
            }
        }

        Ok(LoadedSpecs { cache, diagnostics })
    }

    /// Load a single spec file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a usable `OpenAPI` 3 document.
    pub fn load_file(&self, path: &Path) -> Result<SpecDocument> {
        let content =
            std::fs::read_to_string(path).map_err(|source| OpenApiToolsError::SpecReadFile {
                path: path.display().to_string(),
                source,
            })?;
        let value: Value =
            serde_yaml::from_str(&content).map_err(|source| OpenApiToolsError::SpecParse {
                location: path.display().to_string(),
                source,
            })?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.load_value(DocId::file(path), path.display().to_string(), &stem, value)
    }

    /// Load a spec from a string. `name` stands in for the file name when the document has no
    /// title.
    ///
    /// # Errors
    ///
    /// Returns an error if the content does not parse or is not a usable `OpenAPI` 3 document.
    pub fn load_str(&self, name: &str, content: &str) -> Result<SpecDocument> {
        let value: Value =
            serde_yaml::from_str(content).map_err(|source| OpenApiToolsError::SpecParse {
                location: name.to_string(),
                source,
            })?;
        self.load_value(DocId::Memory(name.to_string()), name.to_string(), name, value)
    }

    fn load_value(
        &self,
        doc_id: DocId,
        source: String,
        file_stem: &str,
        mut value: Value,
    ) -> Result<SpecDocument> {
        let Value::Object(root) = &mut value else {
            return Err(OpenApiToolsError::OpenApi(format!(
                "'{source}' is not an OpenAPI document (top level is not an object)"
            )));
        };
        if root.contains_key("swagger") && !root.contains_key("openapi") {
            return Err(OpenApiToolsError::OpenApi(format!(
                "'{source}' is a Swagger 2.0 document; only OpenAPI 3.x is supported"
            )));
        }
        normalize_document(root);

        let info: Info = serde_json::from_value(root.get("info").cloned().unwrap_or_default())
            .map_err(|e| OpenApiToolsError::OpenApi(format!("invalid info in '{source}': {e}")))?;
        let servers: Vec<Server> = match root.get("servers") {
            Some(v) => serde_json::from_value(v.clone()).unwrap_or_else(|e| {
                tracing::warn!(source = %source, "Ignoring malformed servers: {e}");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let paths = root
            .get("paths")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let title = Some(info.title.trim().to_string()).filter(|t| !t.is_empty());
        let project_id = match title.as_deref() {
            Some(t) => project_id_from_title(t),
            None => {
                tracing::warn!(
                    source = %source,
                    "Document has no title; using file name '{file_stem}' as project"
                );
                file_stem.to_string()
            }
        };
        let base_url = self.base_url(&servers, &source);

        let resolver = OpenApiResolver::new(doc_id, value);
        let (endpoints, diagnostics) =
            EndpointExtractor::new(&resolver, &project_id, &base_url).extract(&paths);

        Ok(SpecDocument {
            project_id,
            title,
            version: info.version,
            source,
            base_url,
            resolver,
            endpoints: endpoints.into_iter().map(Arc::new).collect(),
            diagnostics,
        })
    }

    fn base_url(&self, servers: &[Server], source: &str) -> String {
        let Some(server) = servers.first().filter(|s| !s.url.trim().is_empty()) else {
            tracing::warn!(
                source = %source,
                "No servers declared; using fallback {}",
                self.fallback_url
            );
            return self.fallback_url.clone();
        };

        let mut url = server.url.trim().to_string();
        if let Some(variables) = &server.variables {
            for (name, var) in variables {
                url = url.replace(&format!("{{{name}}}"), &var.default);
            }
        }

        if url.contains("://") {
            url
        } else {
            // Relative server URLs are relative to where the API is hosted.
            format!(
                "{}/{}",
                self.fallback_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }
}

/// Title lower-cased with whitespace runs collapsed to `-`.
#[must_use]
pub fn project_id_from_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

fn discover_spec_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            OpenApiToolsError::Startup(format!("failed to scan '{}': {e}", dir.display()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_spec = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                SPEC_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            });
        if is_spec {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Fill in the fields `openapiv3` requires but real documents often omit.
fn normalize_document(root: &mut Map<String, Value>) {
    root.entry("openapi").or_insert_with(|| json!("3.0.0"));

    let info = root.entry("info").or_insert_with(|| json!({}));
    if let Value::Object(info) = info {
        if !info.get("title").is_some_and(Value::is_string) {
            info.insert("title".to_string(), json!(""));
        }
        if !info.get("version").is_some_and(Value::is_string) {
            let version = info.get("version").map(ToString::to_string).unwrap_or_default();
            info.insert("version".to_string(), json!(version));
        }
    }

    if let Some(Value::Object(paths)) = root.get_mut("paths") {
        for item in paths.values_mut() {
            let Value::Object(item) = item else { continue };
            normalize_parameters(item.get_mut("parameters"));
            for (key, op) in item.iter_mut() {
                if key == "parameters" || key.starts_with("x-") {
                    continue;
                }
                if let Value::Object(op) = op {
                    normalize_operation(op);
                }
            }
        }
    } else {
        root.insert("paths".to_string(), json!({}));
    }

    if let Some(Value::Object(components)) = root.get_mut("components") {
        if let Some(Value::Object(schemas)) = components.get_mut("schemas") {
            schemas.values_mut().for_each(downgrade_schema);
        }
        if let Some(Value::Object(params)) = components.get_mut("parameters") {
            params.values_mut().for_each(normalize_parameter);
        }
        if let Some(Value::Object(headers)) = components.get_mut("headers") {
            headers.values_mut().for_each(normalize_parameter);
        }
        if let Some(Value::Object(responses)) = components.get_mut("responses") {
            responses.values_mut().for_each(normalize_response);
        }
        if let Some(Value::Object(bodies)) = components.get_mut("requestBodies") {
            bodies.values_mut().for_each(normalize_request_body);
        }
    }
}

fn normalize_operation(op: &mut Map<String, Value>) {
    normalize_parameters(op.get_mut("parameters"));
    if let Some(body) = op.get_mut("requestBody") {
        normalize_request_body(body);
    }
    match op.get_mut("responses") {
        Some(Value::Object(responses)) => responses.values_mut().for_each(normalize_response),
        _ => {
            op.insert("responses".to_string(), json!({}));
        }
    }
}

fn normalize_parameters(params: Option<&mut Value>) {
    if let Some(Value::Array(params)) = params {
        params.iter_mut().for_each(normalize_parameter);
    }
}

fn normalize_request_body(body: &mut Value) {
    if let Value::Object(body) = body
        && !body.contains_key("$ref")
    {
        normalize_content(body.entry("content").or_insert_with(|| json!({})));
    }
}

fn normalize_content(content: &mut Value) {
    if let Value::Object(content) = content {
        for media in content.values_mut() {
            if let Some(schema) = media.get_mut("schema") {
                downgrade_schema(schema);
            }
        }
    }
}

fn normalize_response(response: &mut Value) {
    let Value::Object(response) = response else {
        return;
    };
    if response.contains_key("$ref") {
        return;
    }
    if !response.get("description").is_some_and(Value::is_string) {
        response.insert("description".to_string(), json!(""));
    }
    if let Some(Value::Object(headers)) = response.get_mut("headers") {
        headers.values_mut().for_each(normalize_parameter);
    }
    if let Some(content) = response.get_mut("content") {
        normalize_content(content);
    }
}

/// Parameters and headers need either `schema` or `content`; default to a string schema.
fn normalize_parameter(param: &mut Value) {
    let Value::Object(p) = param else { return };
    if p.contains_key("$ref") {
        return;
    }
    if let Some(schema) = p.get_mut("schema") {
        downgrade_schema(schema);
    } else if let Some(content) = p.get_mut("content") {
        normalize_content(content);
    } else {
        p.insert("schema".to_string(), json!({"type": "string"}));
    }
}

/// Rewrite the OpenAPI 3.1 schema forms `openapiv3` cannot read into their 3.0 equivalents.
///
/// A `type` array keeps its first non-`null` entry and sets `nullable` when `null` was listed.
/// Numeric `exclusiveMinimum`/`exclusiveMaximum` become the bound plus a boolean flag.
fn downgrade_schema(schema: &mut Value) {
    let Value::Object(s) = schema else { return };
    if s.contains_key("$ref") {
        return;
    }

    let types = match s.get("type") {
        Some(Value::Array(types)) => Some(types.clone()),
        Some(Value::String(t)) if t == "null" => Some(vec![json!("null")]),
        _ => None,
    };
    if let Some(types) = types {
        let nullable = types.iter().any(|t| t.as_str() == Some("null"));
        match types.into_iter().find(|t| t.as_str().is_some_and(|t| t != "null")) {
            Some(first) => s.insert("type".to_string(), first),
            None => s.remove("type"),
        };
        if nullable {
            s.insert("nullable".to_string(), Value::Bool(true));
        }
    }

    for (flag, bound) in [("exclusiveMinimum", "minimum"), ("exclusiveMaximum", "maximum")] {
        if let Some(limit) = s.get(flag).filter(|v| v.is_number()).cloned() {
            s.insert(bound.to_string(), limit);
            s.insert(flag.to_string(), Value::Bool(true));
        }
    }

    for key in ["items", "not", "additionalProperties"] {
        if let Some(child) = s.get_mut(key) {
            downgrade_schema(child);
        }
    }
    for key in ["allOf", "oneOf", "anyOf"] {
        if let Some(Value::Array(members)) = s.get_mut(key) {
            members.iter_mut().for_each(downgrade_schema);
        }
    }
    if let Some(Value::Object(props)) = s.get_mut("properties") {
        props.values_mut().for_each(downgrade_schema);
    }
}
