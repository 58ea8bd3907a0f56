//! Turning row streams into statements.

use crate::config::LoomConfig;
use crate::mapping::RecordMapper;
use crate::MapperError;
use loom_model::{ModelError, Schema, SchemaRegistry, StatementSink, Triplifier};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

const PROGRESS_EVERY: usize = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    /// Rows that produced statements.
    pub records: usize,
    /// Rows whose mapping came out empty.
    pub skipped: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error(transparent)]
    Mapper(#[from] MapperError),
    #[error("row {row}: {source}")]
    Record { row: usize, source: ModelError },
}

/// One mapping bound to its compiled schema.
#[derive(Debug)]
pub struct Extractor {
    schema: Arc<Schema>,
    mapper: RecordMapper,
    triplifier: Triplifier,
}

impl Extractor {
    pub fn new(schema: Arc<Schema>, mapper: RecordMapper, triplifier: Triplifier) -> Self {
        Self {
            schema,
            mapper,
            triplifier,
        }
    }

    /// The extractor for mapping `name`, using the configured subject policy.
    pub fn from_config(
        config: &LoomConfig,
        registry: &SchemaRegistry,
        name: &str,
    ) -> anyhow::Result<Self> {
        let mapping = config.mapping(name)?;
        let uri = config.mapping_schema_uri(name)?;
        let schema = registry.compile(&uri)?;
        Ok(Self::new(
            schema,
            RecordMapper::new(mapping.mapping.clone()),
            Triplifier::new(config.subject_policy),
        ))
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Map and triplify a single row. Returns the root subject, `None` when
    /// the row maps to nothing.
    pub fn record(
        &self,
        row: &Map<String, Value>,
        sink: &mut dyn StatementSink,
    ) -> Result<Option<String>, ModelError> {
        let root = self.schema.root();
        match self.mapper.apply(&root, row) {
            Some(data) => self.triplifier.triplify(&root, &data, None, sink),
            None => Ok(None),
        }
    }

    /// Run every row through the mapping. Columns are checked against the
    /// first row only; later rows are expected to share its shape.
    pub fn records<I>(&self, rows: I, sink: &mut dyn StatementSink) -> Result<ExtractStats, ExtractError>
    where
        I: IntoIterator<Item = Map<String, Value>>,
    {
        let mut stats = ExtractStats::default();
        for (index, row) in rows.into_iter().enumerate() {
            if index == 0 {
                self.mapper.check_columns(&row)?;
            }
            match self.record(&row, sink) {
                Ok(Some(_)) => stats.records += 1,
                Ok(None) => stats.skipped += 1,
                Err(source) => return Err(ExtractError::Record { row: index + 1, source }),
            }
            if (index + 1) % PROGRESS_EVERY == 0 {
                tracing::info!(
                    schema = self.schema.uri(),
                    rows = index + 1,
                    "extracting records"
                );
            }
        }
        tracing::info!(
            schema = self.schema.uri(),
            records = stats.records,
            skipped = stats.skipped,
            "extraction finished"
        );
        Ok(stats)
    }
}
