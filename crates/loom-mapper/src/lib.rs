//! Loom mappers: flat rows in, statements out.
//!
//! A [`LoomConfig`] names the schemas, the source and a set of mappings. Each
//! mapping is a [`MappingSpec`] that nests `table.column` rows into objects
//! shaped by a schema; an [`Extractor`] pairs one mapping with its compiled
//! schema and feeds the objects through the triplifier.

pub mod config;
pub mod extract;
pub mod mapping;

pub use config::{LoomConfig, MappingConfig, SchemaRef, SourceSpec};
pub use extract::{ExtractError, ExtractStats, Extractor};
pub use mapping::{slugify, FieldMapping, MappingSpec, RecordMapper, Transform};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("mapping references column `{column}` missing from the input")]
    InvalidColumn { column: String },

    #[error("no mapping named `{0}`")]
    NoSuchMapping(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
