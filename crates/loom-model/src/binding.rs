//! Schema bindings: cursors over a compiled [`Schema`].
//!
//! A [`Binding`] is one visit to one schema node. It remembers the property
//! name it was reached through and its parent binding, which is what lets an
//! array's item schema borrow the array's predicate and reverse names. The
//! parent is only ever used for that lookup; bindings never own anything.

use crate::schema::{
    Annotations, Edge, NodeId, ScalarSpec, Schema, SchemaKind, SchemaNode, DEFAULT_SUBJECT_FIELD,
};

#[derive(Debug, Clone, Copy)]
pub struct Binding<'a> {
    schema: &'a Schema,
    node: NodeId,
    /// Annotations of the property edge this binding was reached through.
    edge: Option<&'a Annotations>,
    parent: Option<&'a Binding<'a>>,
    name: &'a str,
}

impl<'a> Binding<'a> {
    pub(crate) fn root(schema: &'a Schema, node: NodeId) -> Self {
        Self {
            schema,
            node,
            edge: None,
            parent: None,
            name: "",
        }
    }

    /// Child binding along `edge`, with `self` as parent.
    pub(crate) fn child<'b>(&'b self, edge: &'a Edge) -> Binding<'b> {
        Binding {
            schema: self.schema,
            node: edge.target,
            edge: Some(&edge.annotations),
            parent: Some(self),
            name: if edge.name.is_empty() { self.name } else { &edge.name },
        }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn node(&self) -> &'a SchemaNode {
        self.schema.node(self.node)
    }

    pub fn kind(&self) -> &'a SchemaKind {
        &self.node().kind
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn parent(&self) -> Option<&'a Binding<'a>> {
        self.parent
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind(), SchemaKind::Object { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind(), SchemaKind::Array { .. })
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind(), SchemaKind::Scalar(_))
    }

    pub fn scalar_spec(&self) -> Option<&'a ScalarSpec> {
        match self.kind() {
            SchemaKind::Scalar(spec) => Some(spec),
            _ => None,
        }
    }

    /// Property bindings of an object schema; empty for anything else.
    pub fn properties<'s>(&'s self) -> impl Iterator<Item = Binding<'s>> + 's {
        let edges: &'s [Edge] = match self.kind() {
            SchemaKind::Object { properties } => properties,
            _ => &[],
        };
        let this: &'s Binding<'s> = self;
        edges.iter().map(move |edge| this.child(edge))
    }

    /// Element binding of an array schema. It keeps the array's name.
    pub fn items(&self) -> Option<Binding<'_>> {
        match self.kind() {
            SchemaKind::Array { items } => Some(self.child(items)),
            _ => None,
        }
    }

    /// First property whose predicate name is `predicate`.
    pub fn property_by_predicate(&self, predicate: &str) -> Option<Binding<'_>> {
        self.properties().find(|prop| prop.predicate_name() == predicate)
    }

    fn declared(&self, pick: impl Fn(&'a Annotations) -> Option<&'a str>) -> Option<&'a str> {
        self.edge
            .and_then(&pick)
            .or_else(|| pick(&self.node().annotations))
    }

    /// `rdfName` if declared, else the enclosing array's predicate, else the
    /// property name.
    pub fn predicate_name(&self) -> &'a str {
        if let Some(name) = self.declared(|a| a.rdf_name.as_deref()) {
            return name;
        }
        match self.parent {
            Some(parent) if parent.is_array() => parent.predicate_name(),
            _ => self.name,
        }
    }

    /// `rdfReverse` if declared. Item schemas inherit the reverse name of
    /// their array, so the inverse edge hangs off each link rather than off
    /// the container.
    pub fn reverse_predicate_name(&self) -> Option<&'a str> {
        if let Some(name) = self.declared(|a| a.rdf_reverse.as_deref()) {
            return Some(name);
        }
        match self.parent {
            Some(parent) if parent.is_array() => parent.reverse_predicate_name(),
            _ => None,
        }
    }

    pub fn type_path(&self) -> Option<&'a str> {
        self.node().type_path.as_deref()
    }

    pub fn subject_field(&self) -> &'a str {
        self.node()
            .subject_field
            .as_deref()
            .unwrap_or(DEFAULT_SUBJECT_FIELD)
    }

    /// Dotted location used in error messages, e.g. `officers[].name`.
    pub fn path(&self) -> String {
        match self.parent {
            None => "$".to_string(),
            Some(parent) if parent.is_array() => format!("{}[]", parent.path()),
            Some(parent) => format!("{}.{}", parent.path(), self.name),
        }
    }
}
