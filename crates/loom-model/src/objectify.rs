//! Rebuilding bounded-depth objects from statements.

use crate::binding::Binding;
use crate::error::{ModelError, ModelResult};
use crate::schema::SchemaKind;
use crate::statement::StatementLoader;
use crate::typecast::{self, StatementType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Key holding the schema URI of a rebuilt object.
pub const SCHEMA_KEY: &str = "$schema";
/// Key holding the sources that contributed to a rebuilt object.
pub const SOURCES_KEY: &str = "$sources";

/// Resolution of several statements for one single-valued property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The statement the loader returns last wins.
    #[default]
    LastWriteWins,
    /// The statement the loader returns first wins.
    FirstWriteWins,
    /// Sources listed earlier win. Unlisted sources rank below every listed
    /// one; equal ranks fall back to last write wins.
    SourcePriority(Vec<String>),
}

impl MergePolicy {
    fn rank(&self, source: &str) -> usize {
        match self {
            MergePolicy::SourcePriority(order) => order
                .iter()
                .position(|s| s == source)
                .unwrap_or(order.len()),
            _ => 0,
        }
    }

    /// Whether a value from `incoming` replaces one from `current`.
    fn replaces(&self, current: &str, incoming: &str) -> bool {
        match self {
            MergePolicy::LastWriteWins => true,
            MergePolicy::FirstWriteWins => false,
            MergePolicy::SourcePriority(_) => self.rank(incoming) <= self.rank(current),
        }
    }
}

/// Rebuilds objects by walking a binding and a statement loader.
///
/// `depth` bounds how far the walk goes. At depth 1 an object is only its
/// shell (`$schema` and `$sources`). Scalar properties appear from depth 2;
/// object and array properties only from depth 3, so the last level of
/// nesting never carries bare link subjects in place of objects.
///
/// A statement pointing back at a subject on the current path is skipped,
/// so cyclic graphs terminate regardless of depth.
///
/// Nested objects carry their subject under the schema's subject field when
/// the schema declares it as a scalar property. The root object does not:
/// its subject is the one the caller asked for.
#[derive(Debug, Clone, Default)]
pub struct Objectifier {
    merge: MergePolicy,
    coerce: bool,
}

impl Objectifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge = policy;
        self
    }

    /// Parse scalar objects back into native JSON using their type tag.
    /// Off by default: scalars come back as the stored text.
    pub fn coerce_scalars(mut self, enabled: bool) -> Self {
        self.coerce = enabled;
        self
    }

    pub fn objectify(
        &self,
        loader: &dyn StatementLoader,
        subject: &str,
        binding: &Binding<'_>,
        depth: i32,
    ) -> ModelResult<Value> {
        let mut path = Vec::new();
        self.walk(loader, subject, StatementType::Link, binding, depth, &mut path)
    }

    fn walk(
        &self,
        loader: &dyn StatementLoader,
        subject: &str,
        kind: StatementType,
        binding: &Binding<'_>,
        depth: i32,
        path: &mut Vec<String>,
    ) -> ModelResult<Value> {
        match binding.kind() {
            SchemaKind::Object { .. } => self.object(loader, subject, binding, depth, path),
            SchemaKind::Array { items } => {
                let item = binding.child(items);
                let value = self.walk(loader, subject, kind, &item, depth, path)?;
                Ok(Value::Array(vec![value]))
            }
            SchemaKind::Scalar(_) => Ok(self.scalar(subject, kind)),
        }
    }

    fn object(
        &self,
        loader: &dyn StatementLoader,
        subject: &str,
        binding: &Binding<'_>,
        depth: i32,
        path: &mut Vec<String>,
    ) -> ModelResult<Value> {
        let mut obj = Map::new();
        obj.insert(
            SCHEMA_KEY.to_string(),
            Value::String(binding.type_path().unwrap_or_default().to_string()),
        );
        let mut sources: Vec<String> = Vec::new();
        // Property -> source of its current single value.
        let mut owners: HashMap<&str, String> = HashMap::new();

        let rows = loader.load(subject).map_err(|source| ModelError::Load {
            subject: subject.to_string(),
            source,
        })?;

        for row in rows {
            let Some(prop) = binding.property_by_predicate(&row.predicate) else {
                continue;
            };
            if depth <= 1 || path.iter().any(|ancestor| *ancestor == row.object) {
                continue;
            }
            if depth <= 2 && !prop.is_scalar() {
                continue;
            }

            if !sources.contains(&row.source) {
                sources.push(row.source.clone());
            }

            let name = prop.name();
            if !prop.is_array() {
                if let Some(current) = owners.get(name) {
                    if !self.merge.replaces(current, &row.source) {
                        tracing::trace!(
                            subject,
                            property = name,
                            kept = %current,
                            dropped = %row.source,
                            "conflicting values"
                        );
                        continue;
                    }
                }
            }

            path.push(subject.to_string());
            let value = self.walk(loader, &row.object, row.kind, &prop, depth - 1, path);
            path.pop();
            let value = value?;

            if prop.is_array() {
                if let Some(Value::Array(existing)) = obj.get_mut(name) {
                    if let Value::Array(more) = value {
                        existing.extend(more);
                    }
                    continue;
                }
            } else {
                owners.insert(name, row.source.clone());
            }
            obj.insert(name.to_string(), value);
        }

        // Keys are never stored as statements. A nested object gets its key
        // back from the subject the link pointed at; the root's is the
        // caller's.
        if !path.is_empty() && depth > 1 {
            let field = binding.subject_field();
            if binding.properties().any(|p| p.name() == field && p.is_scalar()) {
                obj.entry(field.to_string())
                    .or_insert_with(|| Value::String(subject.to_string()));
            }
        }

        obj.insert(
            SOURCES_KEY.to_string(),
            Value::Array(sources.into_iter().map(Value::String).collect()),
        );
        Ok(Value::Object(obj))
    }

    fn scalar(&self, text: &str, kind: StatementType) -> Value {
        match kind.value_type() {
            Some(value_type) if self.coerce => {
                typecast::parse(value_type, text).unwrap_or_else(|err| {
                    tracing::debug!(error = %err, "keeping scalar as text");
                    Value::String(text.to_string())
                })
            }
            _ => Value::String(text.to_string()),
        }
    }
}
