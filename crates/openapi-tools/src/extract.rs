//! Walks the `paths` tree of a loaded document and builds one [`Endpoint`] per operation.
//!
//! Operations are deserialized one at a time, so a malformed operation only drops itself.

use crate::error::{OpenApiToolsError, Result};
use crate::model::{
    Diagnostic, Endpoint, ExampleSpec, HeaderSpec, ItemsDescriptor, MediaTypeSpec, ParamLocation,
    Parameter, RequestBodySpec, ResponseSpec, SchemaSource,
};
use crate::resolver::{DocId, OpenApiResolver, schema_enum_values, schema_type_and_format};
use indexmap::IndexMap;
use openapiv3::{
    Example, Header, MediaType, Operation, ParameterSchemaOrContent, ReferenceOr, RequestBody,
    Response, Schema, SchemaKind, StatusCode, Type,
};
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Operation keys of a path item, in the order endpoints are emitted.
const METHOD_KEYS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

fn http_method(key: &str) -> Option<Method> {
    match key {
        "get" => Some(Method::GET),
        "put" => Some(Method::PUT),
        "post" => Some(Method::POST),
        "delete" => Some(Method::DELETE),
        "options" => Some(Method::OPTIONS),
        "head" => Some(Method::HEAD),
        "patch" => Some(Method::PATCH),
        "trace" => Some(Method::TRACE),
        _ => None,
    }
}

pub struct EndpointExtractor<'a> {
    resolver: &'a OpenApiResolver,
    project_id: &'a str,
    base_url: &'a str,
}

impl<'a> EndpointExtractor<'a> {
    #[must_use]
    pub fn new(resolver: &'a OpenApiResolver, project_id: &'a str, base_url: &'a str) -> Self {
        Self {
            resolver,
            project_id,
            base_url,
        }
    }

    /// Extract every operation under `paths`. Skipped items are reported as diagnostics.
    #[must_use]
    pub fn extract(&self, paths: &Map<String, Value>) -> (Vec<Endpoint>, Vec<Diagnostic>) {
        let mut endpoints = Vec::new();
        let mut diagnostics = Vec::new();

        for (raw_path, item) in paths {
            let path = normalize_path(raw_path);
            let root = self.resolver.root_doc().clone();

            let (doc, item) = match item.get("$ref").and_then(Value::as_str) {
                Some(reference) => match self.resolver.resolve_value(&root, reference) {
                    Ok(found) => found,
                    Err(e) => {
                        tracing::warn!(project = %self.project_id, "Skipping path '{}': {}", path, e);
                        diagnostics.push(Diagnostic::new(
                            format!("{} {}", self.project_id, path),
                            e.to_string(),
                        ));
                        continue;
                    }
                },
                None => (root, item.clone()),
            };

            let path_params = parameter_list(item.get("parameters"), &path);

            for key in METHOD_KEYS {
                let Some(op_value) = item.get(key) else {
                    continue;
                };
                let Some(method) = http_method(key) else {
                    continue;
                };

                match self.extract_operation(&doc, &path, &method, op_value, &path_params) {
                    Ok(endpoint) => endpoints.push(endpoint),
                    Err(e) => {
                        tracing::warn!(
                            project = %self.project_id,
                            "Skipping {} {}: {}",
                            method,
                            path,
                            e
                        );
                        diagnostics.push(Diagnostic::new(
                            format!("{} {} {}", self.project_id, method, path),
                            e.to_string(),
                        ));
                    }
                }
            }
        }

        (endpoints, diagnostics)
    }

    fn extract_operation(
        &self,
        doc: &DocId,
        path: &str,
        method: &Method,
        op_value: &Value,
        path_params: &[ReferenceOr<openapiv3::Parameter>],
    ) -> Result<Endpoint> {
        let op: Operation = serde_json::from_value(op_value.clone()).map_err(|e| {
            OpenApiToolsError::OpenApi(format!("malformed operation: {e}"))
        })?;

        let operation_id = op
            .operation_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(|| default_operation_id(method, path), str::to_string);

        let op_params = parameter_list(op_value.get("parameters"), path);
        let parameters = self.merge_parameters(doc, path, path_params, &op_params);

        let request_body = op
            .request_body
            .as_ref()
            .and_then(|rb| self.extract_request_body(doc, rb, &operation_id));

        let responses = self.extract_responses(doc, &op, &operation_id);

        Ok(Endpoint {
            operation_id,
            method: method.clone(),
            path: path.to_string(),
            summary: op.summary.clone().filter(|s| !s.trim().is_empty()),
            description: op.description.clone().filter(|s| !s.trim().is_empty()),
            base_url: self.base_url.to_string(),
            project_id: self.project_id.to_string(),
            parameters,
            request_body,
            responses,
            tags: op.tags.clone(),
        })
    }

    /// Path-item parameters first, replaced in place by operation parameters with the same
    /// location and name.
    fn merge_parameters(
        &self,
        doc: &DocId,
        path: &str,
        path_level: &[ReferenceOr<openapiv3::Parameter>],
        op_level: &[ReferenceOr<openapiv3::Parameter>],
    ) -> Vec<Parameter> {
        let mut merged: Vec<Parameter> = Vec::new();
        let mut index: HashMap<(ParamLocation, String), usize> = HashMap::new();

        for p in path_level.iter().chain(op_level) {
            let resolved = match self.resolver.resolve(doc, p) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(project = %self.project_id, path, "Skipping parameter: {e}");
                    continue;
                }
            };
            let Some(param) = self.convert_parameter(&resolved.0, resolved.1, path) else {
                continue;
            };

            let key = (param.location, param.name.clone());
            if let Some(i) = index.get(&key).copied() {
                merged[i] = param;
            } else {
                index.insert(key, merged.len());
                merged.push(param);
            }
        }

        merged
    }

    fn convert_parameter(
        &self,
        doc: &DocId,
        param: openapiv3::Parameter,
        path: &str,
    ) -> Option<Parameter> {
        let (location, data) = match param {
            openapiv3::Parameter::Path { parameter_data, .. } => {
                (ParamLocation::Path, parameter_data)
            }
            openapiv3::Parameter::Query { parameter_data, .. } => {
                (ParamLocation::Query, parameter_data)
            }
            openapiv3::Parameter::Header { parameter_data, .. } => {
                (ParamLocation::Header, parameter_data)
            }
            openapiv3::Parameter::Cookie { parameter_data, .. } => {
                tracing::debug!(
                    project = %self.project_id,
                    path,
                    "Ignoring cookie parameter '{}'",
                    parameter_data.name
                );
                return None;
            }
        };

        if location == ParamLocation::Path && !path.contains(&format!("{{{}}}", data.name)) {
            tracing::warn!(
                project = %self.project_id,
                path,
                "Dropping path parameter '{}' that does not appear in the path template",
                data.name
            );
            return None;
        }

        let mut out = Parameter {
            name: data.name,
            location,
            description: data.description.filter(|d| !d.trim().is_empty()),
            required: data.required || location == ParamLocation::Path,
            param_type: "string".to_string(),
            format: None,
            default: None,
            enum_values: Vec::new(),
            items: None,
        };

        let schema = match data.format {
            ParameterSchemaOrContent::Schema(s) => Some(s),
            ParameterSchemaOrContent::Content(content) => {
                content.into_iter().next().and_then(|(_, m)| m.schema)
            }
        };

        if let Some((schema_doc, schema)) =
            schema.and_then(|s| self.resolver.lookup_schema(doc, &s))
        {
            let (type_name, format) = schema_type_and_format(&schema);
            if let Some(t) = type_name {
                out.param_type = t;
            }
            out.format = format;
            out.default = schema.schema_data.default.clone();
            out.enum_values = schema_enum_values(&schema)
                .iter()
                .map(value_to_string)
                .collect();
            out.items = self.items_descriptor(&schema_doc, &schema);
        }

        Some(out)
    }

    fn items_descriptor(&self, doc: &DocId, schema: &Schema) -> Option<ItemsDescriptor> {
        let SchemaKind::Type(Type::Array(arr)) = &schema.schema_kind else {
            return None;
        };
        let items = match arr.items.as_ref()? {
            ReferenceOr::Reference { reference } => ReferenceOr::Reference {
                reference: reference.clone(),
            },
            ReferenceOr::Item(boxed) => ReferenceOr::Item((**boxed).clone()),
        };
        let (_, item_schema) = self.resolver.lookup_schema(doc, &items)?;
        let (item_type, format) = schema_type_and_format(&item_schema);
        Some(ItemsDescriptor {
            item_type: item_type.unwrap_or_else(|| "string".to_string()),
            format,
        })
    }

    fn extract_request_body(
        &self,
        doc: &DocId,
        body: &ReferenceOr<RequestBody>,
        operation_id: &str,
    ) -> Option<RequestBodySpec> {
        match self.resolver.resolve(doc, body) {
            Ok((body_doc, body)) => Some(RequestBodySpec {
                description: body.description,
                required: body.required,
                content: self.media_types(&body_doc, &body.content),
            }),
            Err(e) => {
                tracing::warn!(
                    project = %self.project_id,
                    operation = operation_id,
                    "Ignoring unresolved request body: {e}"
                );
                None
            }
        }
    }

    fn extract_responses(
        &self,
        doc: &DocId,
        op: &Operation,
        operation_id: &str,
    ) -> IndexMap<String, ResponseSpec> {
        let declared = op
            .responses
            .responses
            .iter()
            .map(|(code, r)| (status_key(code), r))
            .chain(op.responses.default.iter().map(|r| ("default".to_string(), r)));

        let mut out = IndexMap::new();
        for (code, response) in declared {
            match self.resolver.resolve::<Response>(doc, response) {
                Ok((response_doc, response)) => {
                    let headers = self.headers(&response_doc, &response.headers);
                    out.insert(
                        code,
                        ResponseSpec {
                            description: response.description,
                            content: self.media_types(&response_doc, &response.content),
                            headers,
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        project = %self.project_id,
                        operation = operation_id,
                        "Ignoring unresolved response '{code}': {e}"
                    );
                }
            }
        }
        out
    }

    fn headers(
        &self,
        doc: &DocId,
        headers: &IndexMap<String, ReferenceOr<Header>>,
    ) -> IndexMap<String, HeaderSpec> {
        headers
            .iter()
            .filter_map(|(name, h)| match self.resolver.resolve(doc, h) {
                Ok((_, header)) => Some((
                    name.clone(),
                    HeaderSpec {
                        description: header.description,
                    },
                )),
                Err(e) => {
                    tracing::warn!(project = %self.project_id, "Ignoring header '{name}': {e}");
                    None
                }
            })
            .collect()
    }

    fn media_types(
        &self,
        doc: &DocId,
        content: &IndexMap<String, MediaType>,
    ) -> IndexMap<String, MediaTypeSpec> {
        content
            .iter()
            .map(|(media_type, m)| {
                let examples = m
                    .examples
                    .iter()
                    .filter_map(|(name, ex)| match self.resolver.resolve::<Example>(doc, ex) {
                        Ok((_, ex)) => Some((
                            name.clone(),
                            ExampleSpec {
                                summary: ex.summary,
                                description: ex.description,
                                value: ex.value,
                            },
                        )),
                        Err(e) => {
                            tracing::warn!(
                                project = %self.project_id,
                                "Ignoring example '{name}': {e}"
                            );
                            None
                        }
                    })
                    .collect();

                (
                    media_type.clone(),
                    MediaTypeSpec {
                        schema: m.schema.clone().map(|schema| SchemaSource {
                            doc: doc.clone(),
                            schema,
                        }),
                        example: m.example.clone(),
                        examples,
                    },
                )
            })
            .collect()
    }
}

/// Deserialize a `parameters` array element by element so one bad entry does not hide the rest.
fn parameter_list(raw: Option<&Value>, path: &str) -> Vec<ReferenceOr<openapiv3::Parameter>> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| match serde_json::from_value(v.clone()) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(path, "Skipping malformed parameter: {e}");
                None
            }
        })
        .collect()
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn default_operation_id(method: &Method, path: &str) -> String {
    let stripped: String = path.chars().filter(char::is_ascii_alphanumeric).collect();
    format!("{}{}", method.as_str().to_ascii_lowercase(), stripped)
}

fn status_key(code: &StatusCode) -> String {
    match code {
        StatusCode::Code(n) => n.to_string(),
        StatusCode::Range(n) => format!("{n}XX"),
    }
}

/// String form of a JSON value for URLs, headers and enum listings.
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}
