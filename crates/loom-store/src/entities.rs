//! Saving and fetching whole entities.

use crate::{CachingLoader, MemoryStore};
use anyhow::Context;
use loom_model::{Objectifier, Schema, SchemaRegistry, Triplifier, DEFAULT_SUBJECT_FIELD};
use serde_json::Value;
use std::sync::Arc;

/// Ties a schema registry to a statement store: objects go in through the
/// triplifier and come back out through the objectifier.
#[derive(Debug)]
pub struct EntityManager {
    registry: Arc<SchemaRegistry>,
    store: Arc<MemoryStore>,
    triplifier: Triplifier,
    objectifier: Objectifier,
}

impl EntityManager {
    pub fn new(registry: Arc<SchemaRegistry>, store: Arc<MemoryStore>) -> Self {
        Self {
            registry,
            store,
            triplifier: Triplifier::default(),
            objectifier: Objectifier::new(),
        }
    }

    pub fn with_triplifier(mut self, triplifier: Triplifier) -> Self {
        self.triplifier = triplifier;
        self
    }

    pub fn with_objectifier(mut self, objectifier: Objectifier) -> Self {
        self.objectifier = objectifier;
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Triplify `data` under the schema at `schema_uri` and store the result
    /// under `source`. Returns the subject of the saved object.
    pub fn save(&self, schema_uri: &str, data: &Value, source: &str) -> anyhow::Result<Option<String>> {
        let schema = self
            .registry
            .compile(schema_uri)
            .with_context(|| format!("failed to compile schema {schema_uri}"))?;
        let mut writer = self.store.writer(source);
        let subject = self
            .triplifier
            .triplify(&schema.root(), data, None, &mut writer)?;
        tracing::debug!(
            schema = schema.uri(),
            subject = subject.as_deref().unwrap_or(""),
            written = writer.written(),
            "saved entity"
        );
        Ok(subject)
    }

    /// Rebuild `subject` to `depth` levels. Without an explicit schema the one
    /// recorded in the type table is used; an untyped subject yields `None`.
    pub fn get(&self, subject: &str, schema: Option<&str>, depth: i32) -> anyhow::Result<Option<Value>> {
        Ok(self.rebuild(subject, schema, depth)?.map(|(_, entity)| entity))
    }

    /// [`get`](Self::get) plus the raw subject under `id`, the shape export
    /// and indexing consumers expect. When the schema keys objects by another
    /// scalar property (`rdfSubject`), the subject is written there as well.
    pub fn document(&self, subject: &str, schema: Option<&str>, depth: i32) -> anyhow::Result<Option<Value>> {
        let Some((schema, mut entity)) = self.rebuild(subject, schema, depth)? else {
            return Ok(None);
        };
        if let Value::Object(fields) = &mut entity {
            let root = schema.root();
            let field = root.subject_field();
            if root.properties().any(|p| p.name() == field && p.is_scalar()) {
                fields
                    .entry(field.to_string())
                    .or_insert_with(|| Value::String(subject.to_string()));
            }
            // A stored `id` property of a schema keyed elsewhere is kept.
            fields
                .entry(DEFAULT_SUBJECT_FIELD.to_string())
                .or_insert_with(|| Value::String(subject.to_string()));
        }
        Ok(Some(entity))
    }

    fn rebuild(
        &self,
        subject: &str,
        schema: Option<&str>,
        depth: i32,
    ) -> anyhow::Result<Option<(Arc<Schema>, Value)>> {
        let uri = match schema {
            Some(uri) => uri.to_string(),
            None => match self.store.schema_of(subject) {
                Some(uri) => uri,
                None => return Ok(None),
            },
        };
        let schema = self
            .registry
            .compile(&uri)
            .with_context(|| format!("failed to compile schema {uri}"))?;
        let loader = CachingLoader::new(self.store.as_ref());
        let entity = self
            .objectifier
            .objectify(&loader, subject, &schema.root(), depth)?;
        Ok(Some((schema, entity)))
    }

    /// Typed subjects, optionally restricted to a schema (resolved against
    /// the registry's base URI) and a source.
    pub fn subjects(&self, schema: Option<&str>, source: Option<&str>) -> anyhow::Result<Vec<String>> {
        let schema = schema
            .map(|uri| self.registry.resolve_uri(uri))
            .transpose()
            .context("invalid schema URI")?;
        let subjects = self.store.subjects(schema.as_deref(), source);
        tracing::info!(
            schema = schema.as_deref().unwrap_or("*"),
            source = source.unwrap_or("*"),
            count = subjects.len(),
            "listing subjects"
        );
        Ok(subjects)
    }
}
