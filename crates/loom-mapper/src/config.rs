//! Mapping configuration files.
//!
//! ```json
//! {
//!   "base_uri": "file:///srv/loom/schemas/",
//!   "schemas": {"company": "company.json"},
//!   "source": {"slug": "sec", "title": "SEC filings", "url": "https://sec.gov"},
//!   "subject_policy": "content_hash",
//!   "merge_policy": {"source_priority": ["sec", "opencorporates"]},
//!   "depth": 3,
//!   "statements_path": "$LOOM_DATA/statements.jsonl",
//!   "mappings": {
//!     "companies": {"schema": "company.json", "mapping": {"symbol": {"column": "companies.symbol"}}}
//!   }
//! }
//! ```
//!
//! Strings outside `mappings` expand `$VAR` and `${VAR}` from the
//! environment; unset variables are left as written. Blank strings count as
//! unset.

use crate::mapping::{slugify, MappingSpec};
use crate::MapperError;
use anyhow::Context;
use loom_model::{MergePolicy, SchemaRegistry, SubjectPolicy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use url::Url;

pub const DEFAULT_DEPTH: i32 = 3;
pub const DEFAULT_STATEMENTS_FILE: &str = "statements.jsonl";

/// The source every statement of a mapping run is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub slug: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A mapping schema: a URI to resolve, or the schema document itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaRef {
    Uri(String),
    Inline(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    pub schema: SchemaRef,
    #[serde(default)]
    pub mapping: MappingSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    base_uri: Option<String>,
    schemas: BTreeMap<String, String>,
    source: Option<SourceSpec>,
    subject_policy: SubjectPolicy,
    merge_policy: MergePolicy,
    depth: Option<i32>,
    statements_path: Option<PathBuf>,
    mappings: BTreeMap<String, MappingConfig>,
}

#[derive(Debug, Clone)]
pub struct LoomConfig {
    pub base_uri: String,
    /// alias -> schema URI
    pub schemas: BTreeMap<String, String>,
    pub source: Option<SourceSpec>,
    pub subject_policy: SubjectPolicy,
    pub merge_policy: MergePolicy,
    pub depth: i32,
    pub statements_path: PathBuf,
    pub mappings: BTreeMap<String, MappingConfig>,
}

impl LoomConfig {
    /// Read a JSON config file. Relative paths and the default base URI are
    /// taken relative to the file's directory.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON in config {}", path.display()))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let dir = std::fs::canonicalize(dir)
            .with_context(|| format!("failed to resolve {}", dir.display()))?;
        Ok(Self::from_value(value, &dir)?)
    }

    pub fn from_value(value: Value, dir: &Path) -> Result<Self, MapperError> {
        let value = expand_config(value);
        let raw: RawConfig = serde_json::from_value(value)
            .map_err(|err| MapperError::Config(err.to_string()))?;

        let base_uri = match raw.base_uri {
            Some(uri) => uri,
            None => Url::from_directory_path(dir)
                .map_err(|_| {
                    MapperError::Config(format!("cannot derive a base URI from {}", dir.display()))
                })?
                .to_string(),
        };
        let statements_path = raw
            .statements_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATEMENTS_FILE));
        let statements_path = if statements_path.is_relative() {
            dir.join(statements_path)
        } else {
            statements_path
        };

        Ok(Self {
            base_uri,
            schemas: raw.schemas,
            source: raw.source,
            subject_policy: raw.subject_policy,
            merge_policy: raw.merge_policy,
            depth: raw.depth.unwrap_or(DEFAULT_DEPTH),
            statements_path,
            mappings: raw.mappings,
        })
    }

    /// Slug of the configured source, `unknown` without one.
    pub fn source_slug(&self) -> &str {
        self.source
            .as_ref()
            .map(|s| s.slug.as_str())
            .unwrap_or("unknown")
    }

    pub fn mapping(&self, name: &str) -> Result<&MappingConfig, MapperError> {
        self.mappings
            .get(name)
            .ok_or_else(|| MapperError::NoSuchMapping(name.to_string()))
    }

    fn resolve(&self, uri: &str) -> Result<String, MapperError> {
        let base = Url::parse(&self.base_uri)
            .map_err(|err| MapperError::Config(format!("invalid base_uri: {err}")))?;
        let url = base
            .join(uri)
            .map_err(|err| MapperError::Config(format!("invalid schema URI `{uri}`: {err}")))?;
        let text = url.to_string();
        Ok(text.strip_suffix('#').map(str::to_string).unwrap_or(text))
    }

    /// Schema URI of the named mapping. Inline schemas without an `id` are
    /// registered as `<mapping>.json`.
    pub fn mapping_schema_uri(&self, name: &str) -> Result<String, MapperError> {
        match &self.mapping(name)?.schema {
            SchemaRef::Uri(uri) => self.resolve(uri),
            SchemaRef::Inline(schema) => match schema.get("id").and_then(Value::as_str) {
                Some(id) => self.resolve(id),
                None => self.resolve(&format!("{name}.json")),
            },
        }
    }

    /// Short name for a schema: its configured alias, else the slug of the
    /// URI's file stem.
    pub fn schema_alias(&self, uri: &str) -> Result<String, MapperError> {
        let resolved = self.resolve(uri)?;
        for (alias, configured) in &self.schemas {
            if configured == uri || self.resolve(configured)? == resolved {
                return Ok(alias.clone());
            }
        }

        let url = Url::parse(&resolved)
            .map_err(|err| MapperError::Config(format!("invalid schema URI `{uri}`: {err}")))?;
        let file = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or("");
        let stem = Path::new(file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("");
        let name = slugify(stem, '_');
        if name.is_empty() || self.schemas.contains_key(&name) {
            return Err(MapperError::Config(format!(
                "cannot determine alias for {uri}"
            )));
        }
        Ok(name)
    }

    /// A registry holding every inline mapping schema, plus every `file://`
    /// schema that the configuration or those schemas reference.
    pub fn registry(&self) -> anyhow::Result<SchemaRegistry> {
        let registry = SchemaRegistry::new(&self.base_uri)?;
        let mut pending: Vec<String> = Vec::new();

        for (name, mapping) in &self.mappings {
            match &mapping.schema {
                SchemaRef::Inline(schema) => {
                    let uri = self.mapping_schema_uri(name)?;
                    registry.add_schema_at(&uri, schema.clone())?;
                    collect_refs(schema, &uri, &mut pending);
                }
                SchemaRef::Uri(uri) => pending.push(self.resolve(uri)?),
            }
        }
        for uri in self.schemas.values() {
            pending.push(self.resolve(uri)?);
        }

        let mut seen: BTreeSet<String> = BTreeSet::new();
        while let Some(uri) = pending.pop() {
            if !seen.insert(uri.clone()) || registry.contains(&uri) {
                continue;
            }
            let url = Url::parse(&uri).with_context(|| format!("invalid schema URI {uri}"))?;
            if url.scheme() != "file" {
                continue;
            }
            let path = url
                .to_file_path()
                .map_err(|_| anyhow::anyhow!("not a local path: {uri}"))?;
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read schema {}", path.display()))?;
            let schema: Value = serde_json::from_str(&text)
                .with_context(|| format!("invalid JSON in schema {}", path.display()))?;
            registry.add_schema_at(&uri, schema.clone())?;
            collect_refs(&schema, &uri, &mut pending);
            tracing::debug!(uri = %uri, "loaded schema document");
        }
        Ok(registry)
    }
}

/// Documents referenced by `$ref`s in `schema`, resolved against `scope`
/// without fragments.
fn collect_refs(schema: &Value, scope: &str, out: &mut Vec<String>) {
    let Ok(scope_url) = Url::parse(scope) else {
        return;
    };
    let scope_url = match schema.get("id").and_then(Value::as_str) {
        Some(id) => scope_url.join(id).unwrap_or(scope_url),
        None => scope_url,
    };
    match schema {
        Value::Object(fields) => {
            if let Some(Value::String(reference)) = fields.get("$ref") {
                if let Ok(mut target) = scope_url.join(reference) {
                    target.set_fragment(None);
                    out.push(target.to_string());
                }
            }
            for (key, value) in fields {
                if key != "$ref" {
                    collect_refs(value, scope_url.as_str(), out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs(item, scope_url.as_str(), out);
            }
        }
        _ => {}
    }
}

// ============================================================================
// Environment expansion
// ============================================================================

fn env_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").ok()
        })
        .as_ref()
}

/// Replace `$VAR` / `${VAR}` with environment values; unknown variables stay.
pub fn expand_vars(text: &str) -> String {
    let Some(pattern) = env_pattern() else {
        return text.to_string();
    };
    pattern
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn expand_config(value: Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| {
                    let value = match key.as_str() {
                        "mappings" => value,
                        // A blank schema entry registers nothing.
                        "schemas" => match expand_value(value) {
                            Value::Object(entries) => Value::Object(
                                entries.into_iter().filter(|(_, uri)| !uri.is_null()).collect(),
                            ),
                            other => other,
                        },
                        _ => expand_value(value),
                    };
                    (key, value)
                })
                .collect(),
        ),
        other => other,
    }
}

fn expand_value(value: Value) -> Value {
    match value {
        Value::String(text) if text.trim().is_empty() => Value::Null,
        Value::String(text) => Value::String(expand_vars(&text)),
        Value::Array(items) => Value::Array(items.into_iter().map(expand_value).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key, expand_value(value)))
                .collect(),
        ),
        other => other,
    }
}
