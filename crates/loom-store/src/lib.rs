//! Loom statement storage
//!
//! Statements are kept in two tables, both tagged with the source they came
//! from:
//!
//! ```text
//!   types       (subject, schema, source)
//!   properties  (subject, predicate, object, type, source)
//! ```
//!
//! Type assertions and property statements are told apart by their type tag,
//! so a schema property that happens to be called `type` stays a property.
//! The store is the [`StatementSink`] the triplifier writes into (through
//! [`MemoryStore::writer`]) and the [`StatementLoader`] the objectifier reads
//! from.

pub mod entities;
pub mod persistence;


pub use entities::EntityManager;
pub use persistence::StoredStatement;

use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use loom_model::{
    LoadedStatement, Statement, StatementLoader, StatementSink, StatementType, TYPE_PREDICATE,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ============================================================================
// Rows
// ============================================================================

/// A type assertion with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRow {
    pub subject: String,
    pub schema: String,
    pub source: String,
}

/// A property statement with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyRow {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    #[serde(rename = "type")]
    pub kind: StatementType,
    pub source: String,
}

/// A data source that statements are attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub slug: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl SourceInfo {
    pub fn new(slug: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            slug: slug.into(),
            title: None,
            url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
struct Tables {
    types: Vec<TypeRow>,
    properties: Vec<PropertyRow>,
    seen_types: AHashSet<TypeRow>,
    seen_properties: AHashSet<PropertyRow>,
    /// subject -> positions in `properties`, in insertion order
    by_subject: AHashMap<String, Vec<usize>>,
    sources: BTreeMap<String, SourceInfo>,
}

impl Tables {
    fn reindex(&mut self) {
        self.seen_types = self.types.iter().cloned().collect();
        self.seen_properties = self.properties.iter().cloned().collect();
        self.by_subject.clear();
        for (pos, row) in self.properties.iter().enumerate() {
            self.by_subject
                .entry(row.subject.clone())
                .or_default()
                .push(pos);
        }
    }
}

/// Statement tables behind a lock, safe for concurrent readers and writers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `statement` under `source`. Returns false when the exact row is
    /// already present.
    pub fn append(&self, statement: Statement, source: &str) -> bool {
        let mut tables = self.tables.write();
        if statement.kind == StatementType::Type {
            let row = TypeRow {
                subject: statement.subject,
                schema: statement.object,
                source: source.to_string(),
            };
            if !tables.seen_types.insert(row.clone()) {
                return false;
            }
            tables.types.push(row);
        } else {
            let row = PropertyRow {
                subject: statement.subject,
                predicate: statement.predicate,
                object: statement.object,
                kind: statement.kind,
                source: source.to_string(),
            };
            if !tables.seen_properties.insert(row.clone()) {
                return false;
            }
            let pos = tables.properties.len();
            tables
                .by_subject
                .entry(row.subject.clone())
                .or_default()
                .push(pos);
            tables.properties.push(row);
        }
        true
    }

    /// A sink that appends everything it receives under `source`.
    pub fn writer(&self, source: &str) -> StoreWriter<'_> {
        StoreWriter {
            store: self,
            source: source.to_string(),
            written: 0,
        }
    }

    /// Property statements of `subject`, in insertion order.
    pub fn load(&self, subject: &str) -> Vec<LoadedStatement> {
        let tables = self.tables.read();
        tables
            .by_subject
            .get(subject)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&pos| {
                        let row = &tables.properties[pos];
                        LoadedStatement::new(
                            row.predicate.clone(),
                            row.object.clone(),
                            row.kind,
                            row.source.clone(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Schema of the first type assertion stored for `subject`.
    pub fn schema_of(&self, subject: &str) -> Option<String> {
        self.tables
            .read()
            .types
            .iter()
            .find(|row| row.subject == subject)
            .map(|row| row.schema.clone())
    }

    /// Typed subjects, sorted and unique, optionally restricted to a schema
    /// and a source.
    pub fn subjects(&self, schema: Option<&str>, source: Option<&str>) -> Vec<String> {
        let tables = self.tables.read();
        let found: BTreeSet<&str> = tables
            .types
            .iter()
            .filter(|row| schema.map_or(true, |s| row.schema == s))
            .filter(|row| source.map_or(true, |s| row.source == s))
            .map(|row| row.subject.as_str())
            .collect();
        found.into_iter().map(str::to_string).collect()
    }

    /// Drop every statement attributed to `source`, and the source itself.
    /// Returns how many rows went.
    pub fn delete_source(&self, source: &str) -> usize {
        let mut tables = self.tables.write();
        let before = tables.types.len() + tables.properties.len();
        tables.types.retain(|row| row.source != source);
        tables.properties.retain(|row| row.source != source);
        tables.reindex();
        tables.sources.remove(source);
        let removed = before - tables.types.len() - tables.properties.len();
        tracing::info!(source, removed, "deleted statements for source");
        removed
    }

    /// Drop every statement and source. Returns how many rows went.
    pub fn clear(&self) -> usize {
        let mut tables = self.tables.write();
        let removed = tables.types.len() + tables.properties.len();
        *tables = Tables::default();
        tracing::info!(removed, "deleted all statements");
        removed
    }

    /// Whether `source` is registered or has statements attributed to it.
    pub fn has_source(&self, source: &str) -> bool {
        let tables = self.tables.read();
        tables.sources.contains_key(source)
            || tables.types.iter().any(|row| row.source == source)
            || tables.properties.iter().any(|row| row.source == source)
    }

    pub fn len_types(&self) -> usize {
        self.tables.read().types.len()
    }

    pub fn len_properties(&self) -> usize {
        self.tables.read().properties.len()
    }

    pub fn is_empty(&self) -> bool {
        let tables = self.tables.read();
        tables.types.is_empty() && tables.properties.is_empty()
    }

    /// Every stored statement, type assertions first, with its source.
    pub fn statements(&self) -> Vec<StoredStatement> {
        let tables = self.tables.read();
        let types = tables.types.iter().map(|row| StoredStatement {
            subject: row.subject.clone(),
            predicate: TYPE_PREDICATE.to_string(),
            object: row.schema.clone(),
            kind: StatementType::Type,
            source: row.source.clone(),
        });
        let properties = tables.properties.iter().map(|row| StoredStatement {
            subject: row.subject.clone(),
            predicate: row.predicate.clone(),
            object: row.object.clone(),
            kind: row.kind,
            source: row.source.clone(),
        });
        types.chain(properties).collect()
    }

    // ------------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------------

    /// Register or update a source by slug. The creation time of an existing
    /// source is kept.
    pub fn upsert_source(&self, mut info: SourceInfo) -> SourceInfo {
        let mut tables = self.tables.write();
        info.updated_at = Utc::now();
        if let Some(existing) = tables.sources.get(&info.slug) {
            info.created_at = existing.created_at;
        }
        tables.sources.insert(info.slug.clone(), info.clone());
        info
    }

    fn restore_sources(&self, sources: Vec<SourceInfo>) {
        let mut tables = self.tables.write();
        for info in sources {
            tables.sources.insert(info.slug.clone(), info);
        }
    }

    /// Registered sources, ordered by slug.
    pub fn sources(&self) -> Vec<SourceInfo> {
        self.tables.read().sources.values().cloned().collect()
    }
}

impl StatementLoader for MemoryStore {
    fn load(&self, subject: &str) -> anyhow::Result<Vec<LoadedStatement>> {
        Ok(MemoryStore::load(self, subject))
    }
}

/// [`StatementSink`] over a [`MemoryStore`] for one source.
#[derive(Debug)]
pub struct StoreWriter<'s> {
    store: &'s MemoryStore,
    source: String,
    written: usize,
}

impl StoreWriter<'_> {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// New rows written so far; duplicates are not counted.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl StatementSink for StoreWriter<'_> {
    fn emit(&mut self, statement: Statement) {
        if self.store.append(statement, &self.source) {
            self.written += 1;
        }
    }
}

// ============================================================================
// Caching loader
// ============================================================================

/// Memoizes loads per subject for the lifetime of one reconstruction.
/// Failed loads are not cached.
pub struct CachingLoader<'l, L: StatementLoader + ?Sized> {
    inner: &'l L,
    cache: Mutex<HashMap<String, Vec<LoadedStatement>>>,
}

impl<'l, L: StatementLoader + ?Sized> CachingLoader<'l, L> {
    pub fn new(inner: &'l L) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

impl<L: StatementLoader + ?Sized> StatementLoader for CachingLoader<'_, L> {
    fn load(&self, subject: &str) -> anyhow::Result<Vec<LoadedStatement>> {
        if let Some(rows) = self.cache.lock().get(subject) {
            return Ok(rows.clone());
        }
        let rows = self.inner.load(subject)?;
        self.cache.lock().insert(subject.to_string(), rows.clone());
        Ok(rows)
    }
}
