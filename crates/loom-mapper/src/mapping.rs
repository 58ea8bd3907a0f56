//! Field mappings: nesting flat rows into schema-shaped objects.
//!
//! A row is a flat map of `table.column` to scalar. A [`MappingSpec`] says,
//! per schema property, where the value comes from:
//!
//! ```json
//! {
//!   "id":       {"column": "companies.symbol"},
//!   "name":     {"columns": ["companies.name", "companies.legal_name"]},
//!   "address":  {"columns": ["companies.street", "companies.city"], "join": ", "},
//!   "country":  {"constant": "US"},
//!   "sector":   {"column": "companies.sector", "default": "unknown", "transforms": ["slugify"]},
//!   "ceo":      {"mapping": {"id": {"column": "ceos.id"}, "name": {"column": "ceos.name"}}}
//! }
//! ```

use crate::MapperError;
use loom_model::{Binding, SchemaKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// String cleanups applied to a mapped value, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    Trim,
    Lower,
    Upper,
    Slugify,
}

impl Transform {
    pub fn apply(&self, text: &str) -> String {
        match self {
            Transform::Trim => text.trim().to_string(),
            Transform::Lower => text.to_lowercase(),
            Transform::Upper => text.to_uppercase(),
            Transform::Slugify => slugify(text, '-'),
        }
    }
}

/// Lowercase alphanumerics with every other run collapsed into `sep`.
pub fn slugify(text: &str, sep: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending && !out.is_empty() {
                out.push(sep);
            }
            pending = false;
            out.extend(c.to_lowercase());
        } else {
            pending = true;
        }
    }
    out
}

/// Where one property's value comes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub column: Option<String>,
    pub columns: Vec<String>,
    /// Join every non-empty column value with this separator instead of
    /// taking the first one.
    pub join: Option<String>,
    pub constant: Option<Value>,
    pub default: Option<Value>,
    pub transforms: Vec<Transform>,
    /// Mapping for an object property, or for the items of an array of
    /// objects.
    pub mapping: Option<MappingSpec>,
}

impl FieldMapping {
    fn sources(&self) -> impl Iterator<Item = &String> {
        self.column.iter().chain(self.columns.iter())
    }

    fn value(&self, row: &Map<String, Value>) -> Value {
        if let Some(constant) = &self.constant {
            return constant.clone();
        }

        let mut found = self
            .sources()
            .filter_map(|column| row.get(column))
            .filter(|value| !is_blank(value));
        let value = match &self.join {
            Some(sep) => {
                let parts: Vec<String> = found.map(text_of).collect();
                if parts.is_empty() {
                    Value::Null
                } else {
                    Value::String(parts.join(sep))
                }
            }
            None => found.next().cloned().unwrap_or(Value::Null),
        };

        let value = match value {
            Value::String(text) if !self.transforms.is_empty() => {
                let text = self
                    .transforms
                    .iter()
                    .fold(text, |acc, transform| transform.apply(&acc));
                if text.is_empty() {
                    Value::Null
                } else {
                    Value::String(text)
                }
            }
            other => other,
        };

        match (value, &self.default) {
            (Value::Null, Some(default)) => default.clone(),
            (value, _) => value,
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Property name -> field mapping, for one object level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingSpec(pub BTreeMap<String, FieldMapping>);

impl MappingSpec {
    pub fn get(&self, property: &str) -> Option<&FieldMapping> {
        self.0.get(property)
    }

    /// Every column the mapping reads, nested mappings included.
    pub fn columns(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut BTreeSet<String>) {
        for field in self.0.values() {
            out.extend(field.sources().cloned());
            if let Some(nested) = &field.mapping {
                nested.collect_columns(out);
            }
        }
    }
}

/// Applies a [`MappingSpec`] to rows under a schema binding.
#[derive(Debug, Clone)]
pub struct RecordMapper {
    spec: MappingSpec,
}

impl RecordMapper {
    pub fn new(spec: MappingSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &MappingSpec {
        &self.spec
    }

    /// Fails on the first referenced column the row does not have.
    pub fn check_columns(&self, row: &Map<String, Value>) -> Result<(), MapperError> {
        match self.spec.columns().into_iter().find(|c| !row.contains_key(c)) {
            Some(column) => Err(MapperError::InvalidColumn { column }),
            None => Ok(()),
        }
    }

    /// Nest `row` into an object shaped by `binding`. `None` when nothing in
    /// the row maps to a value.
    pub fn apply(&self, binding: &Binding<'_>, row: &Map<String, Value>) -> Option<Value> {
        map_object(binding, &self.spec, row)
    }
}

fn map_object(binding: &Binding<'_>, spec: &MappingSpec, row: &Map<String, Value>) -> Option<Value> {
    let mut obj = Map::new();
    for prop in binding.properties() {
        let Some(field) = spec.get(prop.name()) else {
            continue;
        };
        if let Some(value) = map_property(&prop, field, row) {
            obj.insert(prop.name().to_string(), value);
        }
    }
    (!obj.is_empty()).then_some(Value::Object(obj))
}

fn map_property(prop: &Binding<'_>, field: &FieldMapping, row: &Map<String, Value>) -> Option<Value> {
    match prop.kind() {
        SchemaKind::Object { .. } => match &field.mapping {
            Some(nested) => map_object(prop, nested, row),
            None => non_null(field.value(row)),
        },
        SchemaKind::Array { .. } => {
            let item = prop.items()?;
            let value = match (&field.mapping, item.is_object()) {
                (Some(nested), true) => map_object(&item, nested, row),
                _ => non_null(field.value(row)),
            };
            value.map(|value| match value {
                Value::Array(_) => value,
                single => Value::Array(vec![single]),
            })
        }
        SchemaKind::Scalar(_) => non_null(field.value(row)),
    }
}

fn non_null(value: Value) -> Option<Value> {
    (!value.is_null()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_model::SchemaRegistry;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("row must be an object"),
        }
    }

    fn company_registry() -> SchemaRegistry {
        let reg = SchemaRegistry::new("http://schema.test/").unwrap();
        reg.add_schema(json!({
            "id": "company.json",
            "type": "object",
            "rdfSubject": "symbol",
            "properties": {
                "symbol": {"type": "string"},
                "name": {"type": "string"},
                "sector": {"type": "string"},
                "address": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "ceo": {
                    "type": "object",
                    "properties": {"id": {"type": "string"}, "name": {"type": "string"}}
                },
                "officers": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"name": {"type": "string"}}
                    }
                }
            }
        }))
        .unwrap();
        reg
    }

    fn spec(value: Value) -> MappingSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Oil & Gas -- Upstream ", '-'), "oil-gas-upstream");
        assert_eq!(slugify("Company Filings.v2", '_'), "company_filings_v2");
        assert_eq!(slugify("!!!", '-'), "");
    }

    #[test]
    fn scans_nested_columns() {
        let spec = spec(json!({
            "symbol": {"column": "companies.symbol"},
            "name": {"columns": ["companies.name", "companies.legal_name"]},
            "ceo": {"mapping": {"name": {"column": "ceos.name"}}},
            "sector": {"constant": "energy"}
        }));
        let columns: Vec<String> = spec.columns().into_iter().collect();
        assert_eq!(
            columns,
            vec!["ceos.name", "companies.legal_name", "companies.name", "companies.symbol"]
        );
    }

    #[test]
    fn check_columns_names_the_missing_one() {
        let mapper = RecordMapper::new(spec(json!({
            "symbol": {"column": "companies.symbol"},
            "name": {"column": "companies.nme"}
        })));
        let err = mapper
            .check_columns(&row(json!({"companies.symbol": "ACME", "companies.name": "Acme"})))
            .unwrap_err();
        assert!(matches!(err, MapperError::InvalidColumn { ref column } if column == "companies.nme"));
    }

    #[test]
    fn nests_a_row() {
        let reg = company_registry();
        let schema = reg.compile("company.json").unwrap();
        let mapper = RecordMapper::new(spec(json!({
            "symbol": {"column": "companies.symbol"},
            "name": {"columns": ["companies.name", "companies.legal_name"]},
            "sector": {"column": "companies.sector", "default": "unknown", "transforms": ["slugify"]},
            "address": {"columns": ["companies.street", "companies.city"], "join": ", "},
            "tags": {"column": "companies.tag", "transforms": ["trim", "upper"]},
            "ceo": {"mapping": {"id": {"column": "ceos.id"}, "name": {"column": "ceos.name"}}},
            "officers": {"mapping": {"name": {"column": "officers.name"}}}
        })));
        let data = mapper
            .apply(
                &schema.root(),
                &row(json!({
                    "companies.symbol": "ACME",
                    "companies.name": "",
                    "companies.legal_name": "Acme Corp",
                    "companies.sector": "Oil & Gas",
                    "companies.street": "1 Main St",
                    "companies.city": "Springfield",
                    "companies.tag": " energy ",
                    "ceos.id": null,
                    "ceos.name": null,
                    "officers.name": "Ada"
                })),
            )
            .unwrap();
        assert_eq!(
            data,
            json!({
                "symbol": "ACME",
                "name": "Acme Corp",
                "sector": "oil-gas",
                "address": "1 Main St, Springfield",
                "tags": ["ENERGY"],
                "officers": [{"name": "Ada"}]
            })
        );
    }

    #[test]
    fn defaults_fill_empty_columns() {
        let reg = company_registry();
        let schema = reg.compile("company.json").unwrap();
        let mapper = RecordMapper::new(spec(json!({
            "symbol": {"column": "companies.symbol"},
            "sector": {"column": "companies.sector", "default": "unknown"}
        })));
        let data = mapper
            .apply(&schema.root(), &row(json!({"companies.symbol": "X", "companies.sector": "  "})))
            .unwrap();
        assert_eq!(data["sector"], json!("unknown"));
    }

    #[test]
    fn empty_rows_map_to_nothing() {
        let reg = company_registry();
        let schema = reg.compile("company.json").unwrap();
        let mapper = RecordMapper::new(spec(json!({"symbol": {"column": "companies.symbol"}})));
        assert_eq!(mapper.apply(&schema.root(), &row(json!({"companies.symbol": ""}))), None);
    }
}
