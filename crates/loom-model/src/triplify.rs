//! Decomposing schema-shaped objects into statements.

use crate::binding::Binding;
use crate::error::{ModelError, ModelResult};
use crate::schema::SchemaKind;
use crate::statement::{Statement, StatementSink};
use crate::subject::{resolve_subject, SubjectPolicy};
use crate::typecast;
use serde_json::Value;

/// Walks a `(binding, data)` pair and emits statements.
///
/// For each object: its type assertion, the link from its parent (plus the
/// reverse link when the schema names one), then its properties. Arrays are
/// transparent: elements attach to the array's parent subject. Scalars
/// become typed value statements on the enclosing subject.
///
/// Apart from random subjects under [`SubjectPolicy::Random`], output is a
/// pure function of the inputs, so a failed run can simply be repeated.
#[derive(Debug, Clone, Default)]
pub struct Triplifier {
    policy: SubjectPolicy,
}

impl Triplifier {
    pub fn new(policy: SubjectPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SubjectPolicy {
        self.policy
    }

    /// Triplify `data` under `binding`. Returns the subject of `data` when it
    /// is an object.
    pub fn triplify(
        &self,
        binding: &Binding<'_>,
        data: &Value,
        parent: Option<&str>,
        sink: &mut dyn StatementSink,
    ) -> ModelResult<Option<String>> {
        if data.is_null() {
            return Ok(None);
        }

        match binding.kind() {
            SchemaKind::Object { properties } => {
                let fields = data.as_object().ok_or_else(|| shape(binding, "an object"))?;
                let subject = resolve_subject(binding, data, self.policy);

                if let Some(type_path) = binding.type_path() {
                    sink.emit(Statement::type_assertion(&subject, type_path));
                }
                if let Some(parent) = parent {
                    sink.emit(Statement::link(parent, binding.predicate_name(), &subject));
                    if let Some(reverse) = binding.reverse_predicate_name() {
                        sink.emit(Statement::link(&subject, reverse, parent));
                    }
                }

                let subject_field = binding.subject_field();
                for edge in properties {
                    let prop = binding.child(edge);
                    // The key is the subject itself, not a fact about it.
                    if prop.name() == subject_field && prop.is_scalar() {
                        continue;
                    }
                    if let Some(value) = fields.get(prop.name()) {
                        self.triplify(&prop, value, Some(&subject), sink)?;
                    }
                }
                Ok(Some(subject))
            }
            SchemaKind::Array { items } => {
                let elements = data.as_array().ok_or_else(|| shape(binding, "an array"))?;
                let item = binding.child(items);
                for element in elements {
                    self.triplify(&item, element, parent, sink)?;
                }
                Ok(None)
            }
            SchemaKind::Scalar(spec) => {
                let Some(parent) = parent else {
                    tracing::debug!(path = %binding.path(), "skipping scalar without a subject");
                    return Ok(None);
                };
                if let Some((value_type, text)) = typecast::infer(spec, data) {
                    sink.emit(Statement::value(
                        parent,
                        binding.predicate_name(),
                        text,
                        value_type,
                    ));
                }
                Ok(None)
            }
        }
    }

    pub fn triplify_to_vec(&self, binding: &Binding<'_>, data: &Value) -> ModelResult<Vec<Statement>> {
        let mut statements = Vec::new();
        self.triplify(binding, data, None, &mut statements)?;
        Ok(statements)
    }
}

fn shape(binding: &Binding<'_>, expected: &'static str) -> ModelError {
    ModelError::DataShape {
        path: binding.path(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use crate::typecast::{StatementType, ValueType};
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        let reg = SchemaRegistry::new("http://schema.test/").unwrap();
        reg.add_schema(json!({
            "id": "person.json",
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "name": {"type": "string"},
                "age": {"type": "integer"}
            }
        }))
        .unwrap();
        reg.add_schema(json!({
            "id": "company.json",
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "name": {"type": "string"},
                "aliases": {"type": "array", "items": {"type": "string"}},
                "officers": {
                    "type": "array",
                    "rdfName": "officer",
                    "rdfReverse": "officer_of",
                    "items": {"$ref": "person.json"}
                }
            }
        }))
        .unwrap();
        reg
    }

    fn triples(statements: &[Statement]) -> Vec<(&str, &str, &str, &str)> {
        statements
            .iter()
            .map(|s| (s.subject.as_str(), s.predicate.as_str(), s.object.as_str(), s.kind.as_str()))
            .collect()
    }

    #[test]
    fn emits_type_then_properties() {
        let reg = registry();
        let schema = reg.compile("person.json").unwrap();
        let out = Triplifier::default()
            .triplify_to_vec(&schema.root(), &json!({"id": "p1", "name": "Ada", "age": 36}))
            .unwrap();
        assert_eq!(
            triples(&out),
            vec![
                ("p1", "type", "http://schema.test/person.json", "type"),
                ("p1", "age", "36", "integer"),
                ("p1", "name", "Ada", "string"),
            ]
        );
    }

    #[test]
    fn array_elements_link_to_the_outer_subject() {
        let reg = registry();
        let schema = reg.compile("company.json").unwrap();
        let data = json!({
            "id": "c1",
            "aliases": ["ACME", "Acme Inc"],
            "officers": [{"id": "p1", "name": "Ada"}]
        });
        let out = Triplifier::default().triplify_to_vec(&schema.root(), &data).unwrap();
        let found = triples(&out);
        assert!(found.contains(&("c1", "aliases", "ACME", "string")));
        assert!(found.contains(&("c1", "aliases", "Acme Inc", "string")));

        let at = |t: (&str, &str, &str, &str)| found.iter().position(|f| *f == t).unwrap();
        let p1_type = at(("p1", "type", "http://schema.test/person.json", "type"));
        let link = at(("c1", "officer", "p1", "link"));
        let reverse = at(("p1", "officer_of", "c1", "link"));
        let name = at(("p1", "name", "Ada", "string"));
        assert!(p1_type < link && link < reverse && reverse < name);
    }

    #[test]
    fn absent_and_null_fields_emit_nothing() {
        let reg = registry();
        let schema = reg.compile("person.json").unwrap();
        let out = Triplifier::default()
            .triplify_to_vec(&schema.root(), &json!({"id": "p1", "name": null}))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_type_assertion());
    }

    #[test]
    fn missing_keys_are_synthesized() {
        let reg = registry();
        let schema = reg.compile("person.json").unwrap();
        let data = json!({"name": "Ada"});

        let hashed = Triplifier::new(SubjectPolicy::ContentHash);
        let first = hashed.triplify_to_vec(&schema.root(), &data).unwrap();
        let second = hashed.triplify_to_vec(&schema.root(), &data).unwrap();
        assert_eq!(first, second);
        assert!(first[0].subject.starts_with("urn:"));

        let random = Triplifier::new(SubjectPolicy::Random);
        let a = random.triplify_to_vec(&schema.root(), &data).unwrap();
        let b = random.triplify_to_vec(&schema.root(), &data).unwrap();
        assert_ne!(a[0].subject, b[0].subject);
    }

    #[test]
    fn shape_mismatch_names_the_path() {
        let reg = registry();
        let schema = reg.compile("company.json").unwrap();
        let err = Triplifier::default()
            .triplify_to_vec(&schema.root(), &json!({"id": "c1", "officers": "Ada"}))
            .unwrap_err();
        match err {
            ModelError::DataShape { path, expected } => {
                assert_eq!(path, "$.officers");
                assert_eq!(expected, "an array");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn returns_the_root_subject() {
        let reg = registry();
        let schema = reg.compile("person.json").unwrap();
        let mut sink = Vec::new();
        let subject = Triplifier::default()
            .triplify(&schema.root(), &json!({"id": "p9"}), None, &mut sink)
            .unwrap();
        assert_eq!(subject.as_deref(), Some("p9"));
        assert_eq!(sink[0].kind, StatementType::Type);
        assert_ne!(sink[0].kind, StatementType::Value(ValueType::String));
    }
}
