//! Compiled tools and the set they are served from.

use crate::description::{describe_endpoint, tool_summary};
use crate::error::{OpenApiToolsError, Result};
use crate::executor::{RequestExecutor, ToolExecutionResult};
use crate::loader::{DocumentCache, SpecDocument};
use crate::model::{Diagnostic, Endpoint, ParamLocation};
use crate::naming::ToolNameSynthesizer;
use crate::resolver::OpenApiResolver;
use crate::schema::compile_input_schema;
use indexmap::IndexMap;
use rmcp::model::JsonObject;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use swagger_agent_http_tools::semantics::annotations_for_method;

/// One callable operation.
#[derive(Debug)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub summary: String,
    pub endpoint: Arc<Endpoint>,
    /// `{"type": "object", "properties": {...}, "required": [...]}`.
    pub input_schema: Value,
    executor: Arc<RequestExecutor>,
}

impl Tool {
    pub async fn call(&self, arguments: Value) -> ToolExecutionResult {
        tracing::debug!(tool = %self.name, "Calling tool");
        self.executor.execute_value(&self.endpoint, arguments).await
    }

    /// Raw JSON text in, serialized [`ToolExecutionResult`] out.
    pub async fn call_json(&self, arguments: &str) -> String {
        tracing::debug!(tool = %self.name, "Calling tool");
        self.executor
            .execute(&self.endpoint, arguments)
            .await
            .to_json()
    }

    /// MCP view of this tool: name, description, input schema and method annotations.
    #[must_use]
    pub fn to_mcp_tool(&self) -> rmcp::model::Tool {
        let schema = self
            .input_schema
            .as_object()
            .cloned()
            .unwrap_or_else(JsonObject::new);
        let mut tool = rmcp::model::Tool::new(
            self.name.clone(),
            self.description.clone(),
            Arc::new(schema),
        );
        tool.annotations = Some(annotations_for_method(&self.endpoint.method));
        tool
    }

    #[must_use]
    pub fn info(&self) -> ToolInfo {
        let ep = &self.endpoint;
        ToolInfo {
            name: self.name.clone(),
            summary: self.summary.clone(),
            method: ep.method.to_string(),
            path: ep.path.clone(),
            base_url: ep.base_url.clone(),
            controller: ep.controller(),
            parameters: ep
                .visible_parameters()
                .map(|p| ParameterInfo {
                    name: p.name.clone(),
                    param_type: p.param_type.clone(),
                    location: p.location,
                    required: p.required,
                    description: p.description.clone(),
                })
                .collect(),
        }
    }
}

/// Listing entry for one tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub summary: String,
    pub method: String,
    pub path: String,
    pub base_url: String,
    pub controller: String,
    pub parameters: Vec<ParameterInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub location: ParamLocation,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// All tools grouped by project, in load order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolListing {
    pub total_tools: usize,
    pub tools_by_project: IndexMap<String, Vec<ToolInfo>>,
}

/// The result of one compilation pass. Immutable once built.
#[derive(Debug, Default)]
pub struct ToolSet {
    tools: Vec<Arc<Tool>>,
    by_name: HashMap<String, usize>,
    diagnostics: Vec<Diagnostic>,
    documents: DocumentCache,
}

impl ToolSet {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Tool>> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    #[must_use]
    pub fn tools(&self) -> &[Arc<Tool>] {
        &self.tools
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Files, endpoints and tools that were skipped, with the reason.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn documents(&self) -> &DocumentCache {
        &self.documents
    }

    #[must_use]
    pub fn by_project(&self) -> ToolListing {
        let mut tools_by_project: IndexMap<String, Vec<ToolInfo>> = IndexMap::new();
        for tool in &self.tools {
            tools_by_project
                .entry(tool.endpoint.project_id.clone())
                .or_default()
                .push(tool.info());
        }
        ToolListing {
            total_tools: self.tools.len(),
            tools_by_project,
        }
    }

    #[must_use]
    pub fn mcp_tools(&self) -> Vec<rmcp::model::Tool> {
        self.tools.iter().map(|t| t.to_mcp_tool()).collect()
    }
}

/// Turns loaded documents into a [`ToolSet`]. One compiler is one naming scope.
pub struct ToolCompiler {
    names: ToolNameSynthesizer,
    executor: Arc<RequestExecutor>,
}

impl ToolCompiler {
    /// # Errors
    ///
    /// Returns an error if `max_name_len` is below the supported minimum.
    pub fn new(max_name_len: usize, executor: Arc<RequestExecutor>) -> Result<Self> {
        Ok(Self {
            names: ToolNameSynthesizer::new(max_name_len)?,
            executor,
        })
    }

    /// Compile every endpoint of every document in `documents`. Endpoints that fail are skipped
    /// and reported in the set's diagnostics next to `diagnostics` from loading.
    #[must_use]
    pub fn compile(mut self, documents: DocumentCache, diagnostics: Vec<Diagnostic>) -> ToolSet {
        let mut set = ToolSet {
            diagnostics,
            ..ToolSet::default()
        };

        for doc in documents.documents() {
            self.compile_document(&doc, &mut set);
        }

        tracing::info!(
            tools = set.tools.len(),
            projects = documents.project_ids().len(),
            skipped = set.diagnostics.len(),
            "Compiled tools"
        );
        set.documents = documents;
        set
    }

    fn compile_document(&mut self, doc: &SpecDocument, set: &mut ToolSet) {
        for endpoint in &doc.endpoints {
            match self.compile_endpoint(endpoint, &doc.resolver) {
                Ok(tool) => {
                    set.by_name.insert(tool.name.clone(), set.tools.len());
                    set.tools.push(Arc::new(tool));
                }
                Err(e) => {
                    tracing::warn!(project = %doc.project_id, "Skipping endpoint: {e}");
                    set.diagnostics.push(Diagnostic::new(
                        format!("{} {} {}", doc.project_id, endpoint.method, endpoint.path),
                        e.to_string(),
                    ));
                }
            }
        }
    }

    fn compile_endpoint(
        &mut self,
        endpoint: &Arc<Endpoint>,
        resolver: &OpenApiResolver,
    ) -> Result<Tool> {
        if let Some(placeholder) = unbound_placeholder(endpoint) {
            return Err(OpenApiToolsError::ToolCompile {
                tool: endpoint.operation_id.clone(),
                message: format!("path placeholder '{{{placeholder}}}' has no matching parameter"),
            });
        }

        let name = self.names.synthesize(endpoint);
        let compiled = compile_input_schema(endpoint, resolver);
        let description = describe_endpoint(endpoint, resolver);

        tracing::debug!(
            tool = %name,
            method = %endpoint.method,
            path = %endpoint.path,
            "Compiled tool"
        );

        Ok(Tool {
            name,
            description,
            summary: tool_summary(endpoint),
            endpoint: Arc::clone(endpoint),
            input_schema: compiled.input_schema,
            executor: Arc::clone(&self.executor),
        })
    }
}

/// First `{name}` in the path template that no path parameter fills.
fn unbound_placeholder(endpoint: &Endpoint) -> Option<&str> {
    let mut rest = endpoint.path.as_str();
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let end = after.find('}')?;
        let name = &after[..end];
        let bound = endpoint
            .parameters
            .iter()
            .any(|p| p.location == ParamLocation::Path && p.name == name);
        if !bound {
            return Some(name);
        }
        rest = &after[end + 1..];
    }
    None
}
