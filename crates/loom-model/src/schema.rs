//! Schema compilation.
//!
//! Mapping schemas are JSON-Schema-like documents annotated with statement
//! metadata:
//!
//! - `rdfSubject`: the field holding an object's natural key (default `id`)
//! - `rdfName`: predicate name override for a property
//! - `rdfReverse`: inverse predicate emitted alongside a link
//!
//! Documents are registered in a [`SchemaRegistry`] and compiled into an arena
//! of [`SchemaNode`]s. Every `$ref` is resolved at compile time, so a dangling
//! reference fails here rather than halfway through a mapping run. Recursive
//! references (a company whose officers link back to companies) become
//! back-edges in the arena instead of being expanded.

use crate::binding::Binding;
use crate::error::SchemaError;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Index of a node inside a compiled [`Schema`].
pub type NodeId = usize;

pub const DEFAULT_SUBJECT_FIELD: &str = "id";

/// Declared JSON primitive of a scalar schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    String,
    Integer,
    Number,
    Boolean,
}

/// What a scalar schema declares about its values.
///
/// A schema without any recognizable kind compiles to an *untyped* scalar:
/// values pass through opaquely and are typed from the data alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScalarSpec {
    pub primitive: Option<Primitive>,
    pub format: Option<String>,
}

impl ScalarSpec {
    pub fn untyped() -> Self {
        Self::default()
    }

    pub fn is_untyped(&self) -> bool {
        self.primitive.is_none() && self.format.is_none()
    }
}

/// Statement annotations, attached either to a node or to the property edge
/// that reaches it (`{"$ref": "...", "rdfReverse": "..."}`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub rdf_name: Option<String>,
    pub rdf_reverse: Option<String>,
}

impl Annotations {
    fn from_schema(value: &Value) -> Self {
        Self {
            rdf_name: string_field(value, "rdfName"),
            rdf_reverse: string_field(value, "rdfReverse"),
        }
    }
}

/// A named edge from an object to a property schema, or from an array to
/// its item schema.
#[derive(Debug, Clone)]
pub struct Edge {
    pub name: String,
    pub target: NodeId,
    pub annotations: Annotations,
}

#[derive(Debug, Clone)]
pub enum SchemaKind {
    Object { properties: Vec<Edge> },
    Array { items: Edge },
    Scalar(ScalarSpec),
}

#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// Type URI asserted for objects of this schema, if any.
    pub type_path: Option<String>,
    pub subject_field: Option<String>,
    pub annotations: Annotations,
    pub kind: SchemaKind,
}

impl SchemaNode {
    fn placeholder() -> Self {
        Self {
            type_path: None,
            subject_field: None,
            annotations: Annotations::default(),
            kind: SchemaKind::Scalar(ScalarSpec::untyped()),
        }
    }
}

/// A compiled schema: an arena of nodes plus the root.
#[derive(Debug)]
pub struct Schema {
    uri: String,
    nodes: Vec<SchemaNode>,
    root: NodeId,
}

impl Schema {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Binding over the root node.
    pub fn root(&self) -> Binding<'_> {
        Binding::root(self, self.root)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Schema documents and their compiled forms, keyed by resolved URI.
///
/// The registry is an ordinary value: share it with `Arc` between the
/// triplifying and objectifying sides instead of reaching for a global.
pub struct SchemaRegistry {
    base: Url,
    documents: RwLock<HashMap<String, Value>>,
    compiled: RwLock<HashMap<String, Arc<Schema>>>,
}

impl SchemaRegistry {
    pub fn new(base_uri: &str) -> Result<Self, SchemaError> {
        Ok(Self {
            base: parse_uri(base_uri)?,
            documents: RwLock::new(HashMap::new()),
            compiled: RwLock::new(HashMap::new()),
        })
    }

    pub fn base_uri(&self) -> &str {
        self.base.as_str()
    }

    /// Resolve `uri` against the base URI, dropping an empty fragment.
    pub fn resolve_uri(&self, uri: &str) -> Result<String, SchemaError> {
        Ok(canonical(&join(&self.base, uri)?))
    }

    /// Register a document under its own `id`. Returns the resolved URI.
    pub fn add_schema(&self, schema: Value) -> Result<String, SchemaError> {
        let id = string_field(&schema, "id").ok_or(SchemaError::MissingId)?;
        self.add_schema_at(&id, schema)
    }

    /// Register a document under an explicit URI.
    pub fn add_schema_at(&self, uri: &str, schema: Value) -> Result<String, SchemaError> {
        let mut url = join(&self.base, uri)?;
        url.set_fragment(None);
        let key = canonical(&url);

        let mut documents = self.documents.write();
        if documents.get(&key) != Some(&schema) {
            documents.insert(key.clone(), schema);
            self.compiled.write().clear();
        }
        Ok(key)
    }

    pub fn contains(&self, uri: &str) -> bool {
        match join(&self.base, uri) {
            Ok(mut url) => {
                url.set_fragment(None);
                self.documents.read().contains_key(&canonical(&url))
            }
            Err(_) => false,
        }
    }

    /// Compile (or fetch from cache) the schema at `uri`.
    pub fn compile(&self, uri: &str) -> Result<Arc<Schema>, SchemaError> {
        let url = join(&self.base, uri)?;
        let key = canonical(&url);
        if let Some(schema) = self.compiled.read().get(&key) {
            return Ok(Arc::clone(schema));
        }

        let schema = {
            let documents = self.documents.read();
            let mut compiler = Compiler {
                documents: &documents,
                nodes: Vec::new(),
                memo: HashMap::new(),
            };
            let root = compiler.compile_uri(&url, uri)?;
            Arc::new(Schema {
                uri: key.clone(),
                nodes: compiler.nodes,
                root,
            })
        };
        tracing::debug!(uri = %key, nodes = schema.len(), "compiled schema");

        self.compiled.write().insert(key, Arc::clone(&schema));
        Ok(schema)
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("base", &self.base.as_str())
            .field("documents", &self.documents.read().len())
            .field("compiled", &self.compiled.read().len())
            .finish()
    }
}

// ============================================================================
// Compiler
// ============================================================================

struct Compiler<'d> {
    documents: &'d HashMap<String, Value>,
    nodes: Vec<SchemaNode>,
    /// Resolved reference URI -> node, so recursive refs terminate.
    memo: HashMap<String, NodeId>,
}

impl Compiler<'_> {
    fn reserve(&mut self) -> NodeId {
        self.nodes.push(SchemaNode::placeholder());
        self.nodes.len() - 1
    }

    fn compile_uri(&mut self, url: &Url, reference: &str) -> Result<NodeId, SchemaError> {
        let key = canonical(url);
        if let Some(&id) = self.memo.get(&key) {
            return Ok(id);
        }

        let mut document_url = url.clone();
        document_url.set_fragment(None);
        let document_key = canonical(&document_url);
        let document = self
            .documents
            .get(&document_key)
            .ok_or_else(|| SchemaError::UnknownSchema(document_key.clone()))?;

        let pointer = url.fragment().unwrap_or("");
        let value = if pointer.is_empty() {
            document
        } else {
            document
                .pointer(pointer)
                .ok_or_else(|| SchemaError::DanglingRef {
                    reference: reference.to_string(),
                    document: document_key.clone(),
                    pointer: pointer.to_string(),
                })?
        };

        let slot = self.reserve();
        self.memo.insert(key.clone(), slot);
        self.fill(slot, value, url, Some(key.clone()), &key)?;
        Ok(slot)
    }

    fn compile_value(&mut self, value: &Value, scope: &Url, path: &str) -> Result<NodeId, SchemaError> {
        if let Some(reference) = value.get("$ref") {
            let reference = reference.as_str().ok_or_else(|| SchemaError::InvalidRef {
                path: path.to_string(),
            })?;
            let target = join(scope, reference)?;
            return self.compile_uri(&target, reference);
        }

        let slot = self.reserve();
        self.fill(slot, value, scope, None, path)?;
        Ok(slot)
    }

    fn fill(
        &mut self,
        slot: NodeId,
        value: &Value,
        scope: &Url,
        reached_as: Option<String>,
        path: &str,
    ) -> Result<(), SchemaError> {
        let (scope, type_path) = match string_field(value, "id") {
            Some(id) => {
                let url = join(scope, &id)?;
                let declared = canonical(&url);
                (url, Some(declared))
            }
            None => (scope.clone(), reached_as),
        };

        let kind = self.kind(value, &scope, path)?;
        let node = &mut self.nodes[slot];
        node.type_path = type_path;
        node.subject_field = string_field(value, "rdfSubject");
        node.annotations = Annotations::from_schema(value);
        node.kind = kind;
        Ok(())
    }

    fn kind(&mut self, value: &Value, scope: &Url, path: &str) -> Result<SchemaKind, SchemaError> {
        match declared_kind(value, path)? {
            Declared::Object => {
                let properties = match value.get("properties") {
                    None => Vec::new(),
                    Some(Value::Object(props)) => self.properties(props, scope, path)?,
                    Some(_) => {
                        return Err(SchemaError::InvalidProperties {
                            path: path.to_string(),
                        })
                    }
                };
                Ok(SchemaKind::Object { properties })
            }
            Declared::Array => {
                let items = match value.get("items") {
                    Some(items @ Value::Object(_)) => items,
                    _ => {
                        return Err(SchemaError::InvalidItems {
                            path: path.to_string(),
                        })
                    }
                };
                let item_path = format!("{path}/items");
                let target = self.compile_value(items, scope, &item_path)?;
                Ok(SchemaKind::Array {
                    items: Edge {
                        name: String::new(),
                        target,
                        annotations: Annotations::from_schema(items),
                    },
                })
            }
            Declared::Scalar(primitive) => Ok(SchemaKind::Scalar(ScalarSpec {
                primitive,
                format: string_field(value, "format"),
            })),
        }
    }

    fn properties(
        &mut self,
        props: &Map<String, Value>,
        scope: &Url,
        path: &str,
    ) -> Result<Vec<Edge>, SchemaError> {
        let mut edges = Vec::with_capacity(props.len());
        for (name, schema) in props {
            let prop_path = format!("{path}/properties/{name}");
            let target = self.compile_value(schema, scope, &prop_path)?;
            edges.push(Edge {
                name: name.clone(),
                target,
                annotations: Annotations::from_schema(schema),
            });
        }
        Ok(edges)
    }
}

enum Declared {
    Object,
    Array,
    Scalar(Option<Primitive>),
}

fn declared_kind(value: &Value, path: &str) -> Result<Declared, SchemaError> {
    let names: Vec<&str> = match value.get("type") {
        Some(Value::String(name)) => vec![name.as_str()],
        Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    let names: Vec<&str> = names.into_iter().filter(|n| *n != "null").collect();

    if names.is_empty() {
        return Ok(if value.get("properties").is_some() {
            Declared::Object
        } else if value.get("items").is_some() {
            Declared::Array
        } else {
            Declared::Scalar(None)
        });
    }

    // Containers win over primitives in a union type.
    if names.contains(&"object") {
        return Ok(Declared::Object);
    }
    if names.contains(&"array") {
        return Ok(Declared::Array);
    }

    let mut primitive = None;
    for name in names {
        let this = match name {
            "string" => Primitive::String,
            "integer" => Primitive::Integer,
            "number" => Primitive::Number,
            "boolean" => Primitive::Boolean,
            other => {
                return Err(SchemaError::UnknownKind {
                    kind: other.to_string(),
                    path: path.to_string(),
                })
            }
        };
        primitive.get_or_insert(this);
    }
    Ok(Declared::Scalar(primitive))
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_uri(uri: &str) -> Result<Url, SchemaError> {
    Url::parse(uri).map_err(|err| SchemaError::InvalidUri {
        uri: uri.to_string(),
        message: err.to_string(),
    })
}

fn join(base: &Url, reference: &str) -> Result<Url, SchemaError> {
    base.join(reference).map_err(|err| SchemaError::InvalidUri {
        uri: reference.to_string(),
        message: err.to_string(),
    })
}

/// URI text with an empty trailing fragment removed (`x.json#` == `x.json`).
fn canonical(url: &Url) -> String {
    let text = url.as_str();
    text.strip_suffix('#').unwrap_or(text).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new("http://schema.test/").unwrap()
    }

    #[test]
    fn classifies_kinds() {
        let reg = registry();
        let uri = reg
            .add_schema(json!({
                "id": "thing.json",
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "loose": {},
                    "maybe": {"type": ["integer", "null"]}
                }
            }))
            .unwrap();
        let schema = reg.compile(&uri).unwrap();
        let root = schema.root();
        assert!(root.is_object());

        let kinds: Vec<(String, bool, bool, bool)> = root
            .properties()
            .map(|p| (p.name().to_string(), p.is_object(), p.is_array(), p.is_scalar()))
            .collect();
        assert!(kinds.contains(&("tags".to_string(), false, true, false)));
        assert!(kinds.contains(&("loose".to_string(), false, false, true)));

        let maybe = root.properties().find(|p| p.name() == "maybe").unwrap();
        assert_eq!(maybe.scalar_spec().unwrap().primitive, Some(Primitive::Integer));
        let loose = root.properties().find(|p| p.name() == "loose").unwrap();
        assert!(loose.scalar_spec().unwrap().is_untyped());
    }

    #[test]
    fn unknown_type_is_an_error() {
        let reg = registry();
        let uri = reg
            .add_schema(json!({"id": "bad.json", "type": "object",
                "properties": {"x": {"type": "decimal"}}}))
            .unwrap();
        let err = reg.compile(&uri).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownKind { ref kind, .. } if kind == "decimal"));
    }

    #[test]
    fn tuple_arrays_are_rejected() {
        let reg = registry();
        let uri = reg
            .add_schema(json!({"id": "pair.json", "type": "array",
                "items": [{"type": "string"}, {"type": "integer"}]}))
            .unwrap();
        assert!(matches!(reg.compile(&uri), Err(SchemaError::InvalidItems { .. })));
    }

    #[test]
    fn dangling_pointer_fails_at_compile_time() {
        let reg = registry();
        let uri = reg
            .add_schema(json!({"id": "co.json", "type": "object",
                "properties": {"address": {"$ref": "#/definitions/address"}}}))
            .unwrap();
        assert!(matches!(reg.compile(&uri), Err(SchemaError::DanglingRef { .. })));
    }

    #[test]
    fn missing_document_fails_at_compile_time() {
        let reg = registry();
        let uri = reg
            .add_schema(json!({"id": "co.json", "type": "object",
                "properties": {"owner": {"$ref": "person.json"}}}))
            .unwrap();
        assert!(matches!(reg.compile(&uri), Err(SchemaError::UnknownSchema(_))));
    }

    #[test]
    fn recursive_refs_share_nodes() {
        let reg = registry();
        reg.add_schema(json!({
            "id": "company.json",
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "subsidiaries": {"type": "array", "items": {"$ref": "company.json"}}
            }
        }))
        .unwrap();
        let schema = reg.compile("company.json").unwrap();
        // root object, name, array wrapper; items point back at the root.
        assert_eq!(schema.len(), 3);
        let root = schema.root();
        let subs = root.properties().find(|p| p.name() == "subsidiaries").unwrap();
        let item = subs.items().unwrap();
        assert_eq!(item.type_path(), Some("http://schema.test/company.json"));
        assert!(item.is_object());
    }

    #[test]
    fn definitions_are_typed_by_their_reference() {
        let reg = registry();
        reg.add_schema(json!({
            "id": "company.json",
            "type": "object",
            "definitions": {
                "address": {"type": "object", "properties": {"city": {"type": "string"}}}
            },
            "properties": {"address": {"$ref": "#/definitions/address"}}
        }))
        .unwrap();
        let schema = reg.compile("company.json").unwrap();
        let root = schema.root();
        let address = root.properties().next().unwrap();
        assert_eq!(
            address.type_path(),
            Some("http://schema.test/company.json#/definitions/address")
        );
    }

    #[test]
    fn compiled_schemas_are_cached_until_documents_change() {
        let reg = registry();
        let uri = reg
            .add_schema(json!({"id": "a.json", "type": "object", "properties": {}}))
            .unwrap();
        let first = reg.compile(&uri).unwrap();
        let again = reg.compile("a.json").unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        reg.add_schema(json!({"id": "a.json", "type": "object",
            "properties": {"x": {"type": "string"}}}))
            .unwrap();
        let changed = reg.compile(&uri).unwrap();
        assert!(!Arc::ptr_eq(&first, &changed));
        assert_eq!(changed.root().properties().count(), 1);
    }
}
