//! `OpenAPI` `$ref` resolver.
//!
//! The `openapiv3` crate models `$ref`s using `ReferenceOr<T>` but does not resolve them. Specs in
//! the wild split components across files, so this resolver supports:
//! - Local refs (`#/components/schemas/Pet`)
//! - File refs (`./common.yaml#/...`, `/abs/path/spec.yaml#/...`, `file:///...#/...`)
//!
//! URL refs are reported as unresolved; compilation never touches the network.
//!
//! Key detail: `$ref` resolution is **relative to the document that contains the `$ref`**.
//! Callers pass the current document id (`DocId`) when resolving, and get back the id of the
//! document the target was found in.

use crate::error::{OpenApiToolsError, Result};
use openapiv3::{ReferenceOr, Schema, SchemaKind, Type, VariantOrUnknownOrEmpty};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocId {
    File(PathBuf),
    /// A document that only exists in memory (parsed from a string).
    Memory(String),
}

impl DocId {
    #[must_use]
    pub fn file(path: &Path) -> Self {
        DocId::File(canonicalize_best_effort(path.to_path_buf()))
    }

    #[must_use]
    pub fn display(&self) -> String {
        match self {
            DocId::File(p) => p.display().to_string(),
            DocId::Memory(name) => format!("<{name}>"),
        }
    }
}

fn canonicalize_best_effort(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

#[derive(Debug)]
pub struct OpenApiResolver {
    root_doc: DocId,
    docs: RwLock<HashMap<DocId, Arc<Value>>>,
}

impl OpenApiResolver {
    /// Create a resolver whose root document is already parsed.
    #[must_use]
    pub fn new(root_doc: DocId, root: Value) -> Self {
        let mut docs = HashMap::new();
        docs.insert(root_doc.clone(), Arc::new(root));
        Self {
            root_doc,
            docs: RwLock::new(docs),
        }
    }

    #[must_use]
    pub fn root_doc(&self) -> &DocId {
        &self.root_doc
    }

    /// Resolve a `ReferenceOr<T>`, following `$ref` chains until a concrete item is reached.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference points nowhere, a chain loops back on itself, a referenced
    /// file cannot be read, or the target does not deserialize as `T`.
    pub fn resolve<T>(&self, current_doc: &DocId, r: &ReferenceOr<T>) -> Result<(DocId, T)>
    where
        T: Clone + DeserializeOwned,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut doc = current_doc.clone();
        let mut cur: ReferenceOr<T> = r.clone();

        loop {
            match cur {
                ReferenceOr::Item(item) => return Ok((doc, item)),
                ReferenceOr::Reference { reference } => {
                    let key = Self::canonical_ref_key(&doc, &reference)?;
                    if !seen.insert(key) {
                        return Err(OpenApiToolsError::Reference(format!(
                            "Cyclic $ref detected while resolving: {reference}",
                        )));
                    }

                    let (target_doc, value) = self.resolve_value(&doc, &reference)?;
                    let next: ReferenceOr<T> = serde_json::from_value(value).map_err(|e| {
                        OpenApiToolsError::Reference(format!(
                            "Failed to deserialize referenced value '{}' (doc {}) as expected type: {}",
                            reference,
                            target_doc.display(),
                            e
                        ))
                    })?;

                    doc = target_doc;
                    cur = next;
                }
            }
        }
    }

    /// Look up the raw JSON a single `$ref` points at (no chain following).
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is malformed, the target document cannot be loaded, or
    /// the pointer does not exist in it.
    pub fn resolve_value(&self, current_doc: &DocId, reference: &str) -> Result<(DocId, Value)> {
        let (target_doc, pointer) = Self::parse_ref(current_doc, reference)?;
        let doc_value = self.load_doc(&target_doc)?;

        let selected = if let Some(ptr) = pointer {
            doc_value.pointer(&ptr).cloned().ok_or_else(|| {
                OpenApiToolsError::Reference(format!(
                    "Unresolved $ref '{}' (doc {}, missing pointer '{}')",
                    reference,
                    target_doc.display(),
                    ptr
                ))
            })?
        } else {
            (*doc_value).clone()
        };

        Ok((target_doc, selected))
    }

    fn parse_ref(current_doc: &DocId, reference: &str) -> Result<(DocId, Option<String>)> {
        let (doc_part, frag_part) = match reference.split_once('#') {
            Some((d, f)) => (d, Some(f)),
            None => (reference, None),
        };

        let target_doc = Self::resolve_doc(current_doc, doc_part)?;

        let ptr = match frag_part {
            Some("") | None => None,
            Some(frag) if frag.starts_with('/') => Some(frag.to_string()),
            Some(_) => {
                return Err(OpenApiToolsError::Reference(format!(
                    "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}",
                )));
            }
        };

        Ok((target_doc, ptr))
    }

    fn resolve_doc(current_doc: &DocId, doc_part: &str) -> Result<DocId> {
        if doc_part.is_empty() {
            return Ok(current_doc.clone());
        }

        if doc_part.starts_with("http://") || doc_part.starts_with("https://") {
            return Err(OpenApiToolsError::Reference(format!(
                "Remote $ref '{doc_part}' is not supported; vendor the document next to the spec",
            )));
        }

        if doc_part.starts_with("file://") {
            let url = Url::parse(doc_part).map_err(|e| {
                OpenApiToolsError::Reference(format!("Bad $ref file URL '{doc_part}': {e}"))
            })?;
            let path = url.to_file_path().map_err(|()| {
                OpenApiToolsError::Reference(format!("Bad $ref file URL (not a path): {doc_part}"))
            })?;
            return Ok(DocId::File(canonicalize_best_effort(path)));
        }

        let resolved = if Path::new(doc_part).is_absolute() {
            PathBuf::from(doc_part)
        } else {
            match current_doc {
                DocId::File(base) => base
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(doc_part),
                DocId::Memory(_) => PathBuf::from(doc_part),
            }
        };
        Ok(DocId::File(canonicalize_best_effort(resolved)))
    }

    fn canonical_ref_key(current_doc: &DocId, reference: &str) -> Result<String> {
        let (target_doc, pointer) = Self::parse_ref(current_doc, reference)?;
        let mut key = match &target_doc {
            DocId::File(p) => format!("file:{}", p.display()),
            DocId::Memory(name) => format!("memory:{name}"),
        };
        if let Some(ptr) = pointer {
            key.push('#');
            key.push_str(&ptr);
        }
        Ok(key)
    }

    fn load_doc(&self, doc: &DocId) -> Result<Arc<Value>> {
        if let Some(v) = self.docs.read().get(doc).cloned() {
            return Ok(v);
        }

        let content = match doc {
            DocId::File(path) => std::fs::read_to_string(path).map_err(|e| {
                OpenApiToolsError::Reference(format!(
                    "Failed to read referenced file {}: {e}",
                    path.display(),
                ))
            })?,
            DocId::Memory(_) => {
                return Err(OpenApiToolsError::Reference(format!(
                    "Referenced document {} is not loaded",
                    doc.display()
                )));
            }
        };

        let parsed: Value = serde_json::from_str(&content)
            .or_else(|_| serde_yaml::from_str(&content))
            .map_err(|e| {
                OpenApiToolsError::Reference(format!(
                    "Failed to parse referenced document {}: {e}",
                    doc.display(),
                ))
            })?;

        let parsed = Arc::new(parsed);
        self.docs.write().insert(doc.clone(), Arc::clone(&parsed));
        Ok(parsed)
    }

    /// Expand a schema into a plain JSON tree with every `$ref` inlined.
    ///
    /// Emits `type`, `format`, `description`, `enum`, `properties`, `required` and `items`.
    /// `allOf` members are merged into one object; `oneOf`/`anyOf` are expanded member-wise.
    ///
    /// A `$ref` that is already being expanded further up the current branch becomes
    /// `{"description": "circular reference to <Name>"}`. Siblings may reference the same
    /// component freely. A dangling `$ref` logs a warning and becomes `{}`.
    #[must_use]
    pub fn expand_schema(&self, doc: &DocId, schema: &ReferenceOr<Schema>) -> Value {
        let mut ancestors: Vec<String> = Vec::new();
        self.expand_node(doc, schema.into(), &mut ancestors)
    }

    /// Resolve a schema `$ref` to its concrete schema, logging and returning `None` when the
    /// target is missing.
    #[must_use]
    pub fn lookup_schema(&self, doc: &DocId, schema: &ReferenceOr<Schema>) -> Option<(DocId, Schema)> {
        match self.resolve(doc, schema) {
            Ok(found) => Some(found),
            Err(e) => {
                tracing::warn!(doc = %doc.display(), "Dangling schema reference: {e}");
                None
            }
        }
    }

    fn expand_node(&self, doc: &DocId, node: Node<'_>, ancestors: &mut Vec<String>) -> Value {
        match node {
            Node::Item(schema) => self.expand_item(doc, schema, ancestors),
            Node::Ref(reference) => {
                let key = match Self::canonical_ref_key(doc, reference) {
                    Ok(k) => k,
                    Err(e) => {
                        tracing::warn!(doc = %doc.display(), "Dangling schema reference: {e}");
                        return json!({});
                    }
                };
                if ancestors.contains(&key) {
                    return json!({
                        "description": format!("circular reference to {}", ref_name(reference)),
                    });
                }

                let wrapped = ReferenceOr::<Schema>::Reference {
                    reference: reference.to_string(),
                };
                let Some((target_doc, schema)) = self.lookup_schema(doc, &wrapped) else {
                    return json!({});
                };

                ancestors.push(key);
                let expanded = self.expand_item(&target_doc, &schema, ancestors);
                ancestors.pop();
                expanded
            }
        }
    }

    fn expand_item(&self, doc: &DocId, schema: &Schema, ancestors: &mut Vec<String>) -> Value {
        let mut out = Map::new();
        let (type_name, format) = schema_type_and_format(schema);
        if let Some(t) = type_name {
            out.insert("type".to_string(), json!(t));
        }
        if let Some(f) = format {
            out.insert("format".to_string(), json!(f));
        }
        if let Some(desc) = &schema.schema_data.description {
            out.insert("description".to_string(), json!(desc));
        }
        let enum_values = schema_enum_values(schema);
        if !enum_values.is_empty() {
            out.insert("enum".to_string(), Value::Array(enum_values));
        }

        match &schema.schema_kind {
            SchemaKind::Type(Type::Object(obj)) => {
                self.expand_properties(doc, obj.properties.iter(), &obj.required, &mut out, ancestors);
            }
            SchemaKind::Type(Type::Array(arr)) => {
                if let Some(items) = &arr.items {
                    out.insert("items".to_string(), self.expand_node(doc, items.into(), ancestors));
                }
            }
            SchemaKind::Type(_) | SchemaKind::Not { .. } => {}
            SchemaKind::AllOf { all_of } => self.merge_all_of(doc, all_of, &mut out, ancestors),
            SchemaKind::OneOf { one_of } => {
                let members = self.expand_members(doc, one_of, ancestors);
                out.insert("oneOf".to_string(), members);
            }
            SchemaKind::AnyOf { any_of } => {
                let members = self.expand_members(doc, any_of, ancestors);
                out.insert("anyOf".to_string(), members);
            }
            SchemaKind::Any(any) => {
                if !any.properties.is_empty() {
                    self.expand_properties(doc, any.properties.iter(), &any.required, &mut out, ancestors);
                }
                if let Some(items) = &any.items {
                    out.insert("items".to_string(), self.expand_node(doc, items.into(), ancestors));
                }
                if !any.all_of.is_empty() {
                    self.merge_all_of(doc, &any.all_of, &mut out, ancestors);
                }
                if !any.one_of.is_empty() {
                    let members = self.expand_members(doc, &any.one_of, ancestors);
                    out.insert("oneOf".to_string(), members);
                }
                if !any.any_of.is_empty() {
                    let members = self.expand_members(doc, &any.any_of, ancestors);
                    out.insert("anyOf".to_string(), members);
                }
            }
        }

        Value::Object(out)
    }

    fn expand_properties<'s>(
        &self,
        doc: &DocId,
        properties: impl Iterator<Item = (&'s String, &'s ReferenceOr<Box<Schema>>)>,
        required: &[String],
        out: &mut Map<String, Value>,
        ancestors: &mut Vec<String>,
    ) {
        let mut props = Map::new();
        for (name, prop) in properties {
            props.insert(name.clone(), self.expand_node(doc, prop.into(), ancestors));
        }
        out.insert("properties".to_string(), Value::Object(props));
        if !required.is_empty() {
            out.insert("required".to_string(), json!(required));
        }
    }

    fn expand_members(
        &self,
        doc: &DocId,
        members: &[ReferenceOr<Schema>],
        ancestors: &mut Vec<String>,
    ) -> Value {
        Value::Array(
            members
                .iter()
                .map(|m| self.expand_node(doc, m.into(), ancestors))
                .collect(),
        )
    }

    fn merge_all_of(
        &self,
        doc: &DocId,
        members: &[ReferenceOr<Schema>],
        out: &mut Map<String, Value>,
        ancestors: &mut Vec<String>,
    ) {
        let mut properties = match out.remove("properties") {
            Some(Value::Object(p)) => p,
            _ => Map::new(),
        };
        let mut required: Vec<Value> = match out.remove("required") {
            Some(Value::Array(r)) => r,
            _ => Vec::new(),
        };

        for member in members {
            let Value::Object(mut expanded) = self.expand_node(doc, member.into(), ancestors)
            else {
                continue;
            };
            if let Some(Value::Object(p)) = expanded.remove("properties") {
                properties.extend(p);
            }
            if let Some(Value::Array(r)) = expanded.remove("required") {
                for name in r {
                    if !required.contains(&name) {
                        required.push(name);
                    }
                }
            }
            for key in ["type", "format", "description"] {
                if let Some(v) = expanded.remove(key) {
                    out.entry(key.to_string()).or_insert(v);
                }
            }
        }

        if !properties.is_empty() {
            out.entry("type".to_string()).or_insert_with(|| json!("object"));
            out.insert("properties".to_string(), Value::Object(properties));
        }
        if !required.is_empty() {
            out.insert("required".to_string(), Value::Array(required));
        }
    }
}

/// Borrowed view over the two ways `openapiv3` stores schema references.
#[derive(Clone, Copy)]
enum Node<'a> {
    Ref(&'a str),
    Item(&'a Schema),
}

impl<'a> From<&'a ReferenceOr<Schema>> for Node<'a> {
    fn from(r: &'a ReferenceOr<Schema>) -> Self {
        match r {
            ReferenceOr::Reference { reference } => Node::Ref(reference),
            ReferenceOr::Item(s) => Node::Item(s),
        }
    }
}

impl<'a> From<&'a ReferenceOr<Box<Schema>>> for Node<'a> {
    fn from(r: &'a ReferenceOr<Box<Schema>>) -> Self {
        match r {
            ReferenceOr::Reference { reference } => Node::Ref(reference),
            ReferenceOr::Item(s) => Node::Item(s),
        }
    }
}

/// Last segment of a `$ref`, e.g. `Pet` for `#/components/schemas/Pet`.
#[must_use]
pub fn ref_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

/// Declared type name and format of a schema, when it has one.
#[must_use]
pub fn schema_type_and_format(schema: &Schema) -> (Option<String>, Option<String>) {
    match &schema.schema_kind {
        SchemaKind::Type(Type::String(s)) => (Some("string".to_string()), format_name(&s.format)),
        SchemaKind::Type(Type::Number(n)) => (Some("number".to_string()), format_name(&n.format)),
        SchemaKind::Type(Type::Integer(i)) => {
            (Some("integer".to_string()), format_name(&i.format))
        }
        SchemaKind::Type(Type::Boolean(_)) => (Some("boolean".to_string()), None),
        SchemaKind::Type(Type::Object(_)) => (Some("object".to_string()), None),
        SchemaKind::Type(Type::Array(_)) => (Some("array".to_string()), None),
        SchemaKind::Any(any) => (any.typ.clone(), any.format.clone()),
        SchemaKind::AllOf { .. }
        | SchemaKind::OneOf { .. }
        | SchemaKind::AnyOf { .. }
        | SchemaKind::Not { .. } => (None, None),
    }
}

/// Declared `enum` values of a schema (nulls dropped).
#[must_use]
pub fn schema_enum_values(schema: &Schema) -> Vec<Value> {
    fn collect<T: Serialize>(values: &[Option<T>]) -> Vec<Value> {
        values
            .iter()
            .flatten()
            .filter_map(|v| serde_json::to_value(v).ok())
            .collect()
    }

    match &schema.schema_kind {
        SchemaKind::Type(Type::String(s)) => collect(&s.enumeration),
        SchemaKind::Type(Type::Number(n)) => collect(&n.enumeration),
        SchemaKind::Type(Type::Integer(i)) => collect(&i.enumeration),
        SchemaKind::Type(Type::Boolean(b)) => collect(&b.enumeration),
        SchemaKind::Any(any) => any
            .enumeration
            .iter()
            .filter(|v| !v.is_null())
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

fn format_name<T: Serialize>(format: &VariantOrUnknownOrEmpty<T>) -> Option<String> {
    match format {
        VariantOrUnknownOrEmpty::Item(v) => serde_json::to_value(v)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string)),
        VariantOrUnknownOrEmpty::Unknown(s) => Some(s.clone()),
        VariantOrUnknownOrEmpty::Empty => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openapiv3::{Parameter, RequestBody};
    use std::fs;
    use tempfile::tempdir;

    fn memory_resolver(yaml: &str) -> OpenApiResolver {
        let root: Value = serde_yaml::from_str(yaml).unwrap();
        OpenApiResolver::new(DocId::Memory("test".to_string()), root)
    }

    fn schema_ref(reference: &str) -> ReferenceOr<Schema> {
        ReferenceOr::Reference {
            reference: reference.to_string(),
        }
    }

    #[test]
    fn resolves_local_parameter_ref() {
        let resolver = memory_resolver(
            r"
components:
  parameters:
    Limit:
      name: limit
      in: query
      schema: { type: integer }
",
        );
        let r: ReferenceOr<Parameter> = ReferenceOr::Reference {
            reference: "#/components/parameters/Limit".to_string(),
        };
        let (_, p) = resolver.resolve(resolver.root_doc(), &r).unwrap();
        assert_eq!(p.parameter_data_ref().name, "limit");
    }

    #[test]
    fn ref_chain_loop_is_an_error() {
        let resolver = memory_resolver(
            r"
components:
  requestBodies:
    A: { $ref: '#/components/requestBodies/B' }
    B: { $ref: '#/components/requestBodies/A' }
",
        );
        let r: ReferenceOr<RequestBody> = ReferenceOr::Reference {
            reference: "#/components/requestBodies/A".to_string(),
        };
        let err = resolver.resolve(resolver.root_doc(), &r).unwrap_err();
        assert!(err.to_string().contains("Cyclic $ref"));
    }

    #[test]
    fn expand_inlines_nested_refs() {
        let resolver = memory_resolver(
            r"
components:
  schemas:
    Order:
      type: object
      required: [sku]
      properties:
        sku: { type: string, description: Stock keeping unit }
        qty: { type: integer, format: int32 }
        status: { $ref: '#/components/schemas/Status' }
    Status:
      type: string
      enum: [open, closed]
",
        );
        let tree = resolver.expand_schema(resolver.root_doc(), &schema_ref("#/components/schemas/Order"));

        assert_eq!(tree["type"], "object");
        assert_eq!(tree["required"], json!(["sku"]));
        assert_eq!(tree["properties"]["sku"]["description"], "Stock keeping unit");
        assert_eq!(tree["properties"]["qty"]["format"], "int32");
        assert_eq!(tree["properties"]["status"]["enum"], json!(["open", "closed"]));
    }

    #[test]
    fn expand_stops_at_self_reference() {
        let resolver = memory_resolver(
            r"
components:
  schemas:
    Node:
      type: object
      properties:
        value: { type: string }
        next: { $ref: '#/components/schemas/Node' }
        children:
          type: array
          items: { $ref: '#/components/schemas/Node' }
",
        );
        let tree = resolver.expand_schema(resolver.root_doc(), &schema_ref("#/components/schemas/Node"));

        assert_eq!(
            tree["properties"]["next"]["description"],
            "circular reference to Node"
        );
        assert_eq!(
            tree["properties"]["children"]["items"]["description"],
            "circular reference to Node"
        );
    }

    #[test]
    fn expand_allows_sibling_reuse() {
        let resolver = memory_resolver(
            r"
components:
  schemas:
    Address:
      type: object
      properties:
        city: { type: string }
    Customer:
      type: object
      properties:
        billing: { $ref: '#/components/schemas/Address' }
        shipping: { $ref: '#/components/schemas/Address' }
",
        );
        let tree = resolver.expand_schema(resolver.root_doc(), &schema_ref("#/components/schemas/Customer"));
        assert_eq!(tree["properties"]["billing"]["properties"]["city"]["type"], "string");
        assert_eq!(tree["properties"]["shipping"]["properties"]["city"]["type"], "string");
    }

    #[test]
    fn expand_dangling_ref_is_empty_object() {
        let resolver = memory_resolver("components: {}");
        let tree = resolver.expand_schema(resolver.root_doc(), &schema_ref("#/components/schemas/Missing"));
        assert_eq!(tree, json!({}));
    }

    #[test]
    fn expand_merges_all_of() {
        let resolver = memory_resolver(
            r"
components:
  schemas:
    Base:
      type: object
      required: [id]
      properties:
        id: { type: string }
    Pet:
      allOf:
        - $ref: '#/components/schemas/Base'
        - type: object
          required: [name]
          properties:
            name: { type: string }
",
        );
        let tree = resolver.expand_schema(resolver.root_doc(), &schema_ref("#/components/schemas/Pet"));
        assert_eq!(tree["type"], "object");
        assert!(tree["properties"].get("id").is_some());
        assert!(tree["properties"].get("name").is_some());
        assert_eq!(tree["required"], json!(["id", "name"]));
    }

    #[test]
    fn resolves_relative_file_ref_from_the_containing_document() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("shared")).unwrap();
        fs::write(
            dir.path().join("shared/schemas.yaml"),
            r"
components:
  schemas:
    Money:
      type: object
      properties:
        currency: { $ref: '#/components/schemas/Currency' }
    Currency:
      type: string
      format: iso4217
",
        )
        .unwrap();
        let root_path = dir.path().join("root.yaml");
        fs::write(&root_path, "openapi: 3.0.0\n").unwrap();

        let resolver = OpenApiResolver::new(DocId::file(&root_path), json!({"openapi": "3.0.0"}));
        let tree = resolver.expand_schema(
            resolver.root_doc(),
            &schema_ref("./shared/schemas.yaml#/components/schemas/Money"),
        );
        assert_eq!(tree["properties"]["currency"]["format"], "iso4217");
    }

    #[test]
    fn remote_refs_are_rejected() {
        let resolver = memory_resolver("{}");
        let err = resolver
            .resolve_value(resolver.root_doc(), "https://example.com/common.yaml#/x")
            .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::Reference(_)));
    }
}
