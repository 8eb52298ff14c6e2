//! Input schema compilation.
//!
//! Tools take one flat JSON object. Path, query and header parameters become top-level
//! properties, and so do the top-level properties of the request body schema. The request
//! executor splits the object back apart by name.

use crate::config::is_security_name;
use crate::model::{Endpoint, Parameter};
use crate::resolver::OpenApiResolver;
use serde_json::{Map, Value, json};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSchema {
    /// `{"type": "object", "properties": {...}, "required": [...]}`; `required` is omitted when
    /// empty.
    pub input_schema: Value,
    pub required: Vec<String>,
}

/// Map a declared parameter type onto the small set of types exposed to callers.
#[must_use]
pub fn map_param_type(declared: &str) -> &'static str {
    match declared.to_ascii_lowercase().as_str() {
        "integer" | "number" => "number",
        "boolean" => "boolean",
        _ => "string",
    }
}

#[must_use]
pub fn compile_input_schema(endpoint: &Endpoint, resolver: &OpenApiResolver) -> CompiledSchema {
    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();

    for param in endpoint.visible_parameters() {
        properties.insert(param.name.clone(), parameter_property(param));
        if param.required && !required.contains(&param.name) {
            required.push(param.name.clone());
        }
    }

    if let Some((media_type, media)) = endpoint
        .request_body
        .as_ref()
        .and_then(|b| b.preferred_media_type())
        && let Some(source) = &media.schema
    {
        let tree = resolver.expand_schema(&source.doc, &source.schema);
        splice_body(endpoint, media_type, &tree, &mut properties, &mut required);
    }

    required.retain(|name| properties.contains_key(name));

    let mut input_schema = json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        input_schema["required"] = json!(required);
    }

    CompiledSchema {
        input_schema,
        required,
    }
}

fn parameter_property(param: &Parameter) -> Value {
    let mut prop = Map::new();
    prop.insert(
        "type".to_string(),
        json!(map_param_type(&param.param_type)),
    );
    if let Some(desc) = &param.description {
        prop.insert("description".to_string(), json!(desc));
    }
    if !param.enum_values.is_empty() {
        prop.insert("enum".to_string(), json!(param.enum_values));
    }
    if let Some(default) = &param.default {
        prop.insert("default".to_string(), default.clone());
    }
    Value::Object(prop)
}

fn splice_body(
    endpoint: &Endpoint,
    media_type: &str,
    tree: &Value,
    properties: &mut Map<String, Value>,
    required: &mut Vec<String>,
) {
    let Some(body_props) = tree.get("properties").and_then(Value::as_object) else {
        tracing::debug!(
            operation = %endpoint.operation_id,
            media_type,
            "Request body schema has no top-level properties; nothing to expose"
        );
        return;
    };

    let mut spliced: HashSet<&str> = HashSet::new();
    for (name, prop) in body_props {
        if is_security_name(name) {
            continue;
        }
        if properties.contains_key(name) {
            tracing::warn!(
                operation = %endpoint.operation_id,
                property = %name,
                "Body property shadows a parameter with the same name; keeping the parameter"
            );
            continue;
        }
        properties.insert(name.clone(), prop.clone());
        spliced.insert(name);
    }

    let body_required = tree
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);
    for name in body_required {
        if spliced.contains(name) && !required.iter().any(|r| r == name) {
            required.push(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SpecLoader;

    fn compile(yaml: &str) -> CompiledSchema {
        let doc = SpecLoader::new("http://localhost:8080")
            .load_str("test", yaml)
            .unwrap();
        compile_input_schema(&doc.endpoints[0], &doc.resolver)
    }

    #[test]
    fn maps_parameter_types() {
        assert_eq!(map_param_type("integer"), "number");
        assert_eq!(map_param_type("Number"), "number");
        assert_eq!(map_param_type("BOOLEAN"), "boolean");
        assert_eq!(map_param_type("string"), "string");
        assert_eq!(map_param_type("array"), "string");
        assert_eq!(map_param_type("object"), "string");
    }

    #[test]
    fn merges_parameters_and_body_properties() {
        let compiled = compile(
            r"
paths:
  /orders/{storeId}:
    post:
      parameters:
        - { name: storeId, in: path, description: Store, schema: { type: integer } }
        - { name: dryRun, in: query, schema: { type: boolean, default: false } }
        - { name: sort, in: query, schema: { type: string, enum: [asc, desc] } }
      requestBody:
        content:
          application/json:
            schema:
              type: object
              required: [sku]
              properties:
                sku: { type: string }
                qty: { type: integer }
",
        );
        let props = compiled.input_schema["properties"].as_object().unwrap();
        assert_eq!(props["storeId"], json!({"type": "number", "description": "Store"}));
        assert_eq!(props["dryRun"], json!({"type": "boolean", "default": false}));
        assert_eq!(props["sort"]["enum"], json!(["asc", "desc"]));
        assert_eq!(props["qty"], json!({"type": "integer"}));
        assert_eq!(compiled.required, vec!["storeId", "sku"]);
        assert_eq!(compiled.input_schema["required"], json!(["storeId", "sku"]));
    }

    #[test]
    fn security_names_never_become_properties() {
        let compiled = compile(
            r"
paths:
  /secure:
    put:
      parameters:
        - { name: Authorization, in: header, required: true, schema: { type: string } }
        - { name: traffic-code, in: header, schema: { type: string } }
      requestBody:
        content:
          application/json:
            schema:
              type: object
              required: [Authorization]
              properties:
                Authorization: { type: string }
                note: { type: string }
",
        );
        let props = compiled.input_schema["properties"].as_object().unwrap();
        assert_eq!(props.keys().collect::<Vec<_>>(), vec!["note"]);
        assert!(compiled.required.is_empty());
        assert!(compiled.input_schema.get("required").is_none());
    }

    #[test]
    fn parameter_wins_over_body_property_with_same_name() {
        let compiled = compile(
            r"
paths:
  /items/{id}:
    patch:
      parameters:
        - { name: id, in: path, schema: { type: string } }
      requestBody:
        content:
          application/json:
            schema:
              type: object
              required: [id, name]
              properties:
                id: { type: integer, description: body id }
                name: { type: string }
",
        );
        let props = compiled.input_schema["properties"].as_object().unwrap();
        assert_eq!(props["id"], json!({"type": "string"}));
        assert_eq!(compiled.required, vec!["id", "name"]);
    }

    #[test]
    fn required_only_lists_existing_properties() {
        let compiled = compile(
            r"
paths:
  /things:
    post:
      requestBody:
        content:
          application/json:
            schema:
              type: object
              required: [ghost, real]
              properties:
                real: { type: string }
",
        );
        assert_eq!(compiled.required, vec!["real"]);
    }

    #[test]
    fn self_referential_body_terminates() {
        let compiled = compile(
            r"
components:
  schemas:
    Category:
      type: object
      properties:
        name: { type: string }
        parent: { $ref: '#/components/schemas/Category' }
paths:
  /categories:
    post:
      requestBody:
        content:
          application/json:
            schema: { $ref: '#/components/schemas/Category' }
",
        );
        let props = compiled.input_schema["properties"].as_object().unwrap();
        assert_eq!(
            props["parent"]["description"],
            "circular reference to Category"
        );
    }

    #[test]
    fn prefers_json_media_type() {
        let compiled = compile(
            r"
paths:
  /upload:
    post:
      requestBody:
        content:
          application/x-www-form-urlencoded:
            schema:
              type: object
              properties:
                form_field: { type: string }
          application/json:
            schema:
              type: object
              properties:
                json_field: { type: string }
",
        );
        let props = compiled.input_schema["properties"].as_object().unwrap();
        assert!(props.contains_key("json_field"));
        assert!(!props.contains_key("form_field"));
    }

    #[test]
    fn dangling_body_schema_still_compiles() {
        let compiled = compile(
            r"
paths:
  /orders:
    post:
      parameters:
        - { name: traceId, in: header, schema: { type: string } }
      requestBody:
        content:
          application/json:
            schema: { $ref: '#/components/schemas/Missing' }
",
        );
        assert_eq!(
            compiled.input_schema,
            json!({"type": "object", "properties": {"traceId": {"type": "string"}}})
        );
    }
}
