//! Error types for the statement model.

use thiserror::Error;

/// Malformed mapping schemas. Raised while compiling a schema, never during
/// traversal.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema not registered: {0}")]
    UnknownSchema(String),

    #[error("schema document has no `id` to register it under")]
    MissingId,

    #[error("dangling reference `{reference}`: nothing at `{pointer}` in {document}")]
    DanglingRef {
        reference: String,
        document: String,
        pointer: String,
    },

    #[error("invalid `$ref` at {path}: expected a string")]
    InvalidRef { path: String },

    #[error("unrecognized schema type `{kind}` at {path}")]
    UnknownKind { kind: String, path: String },

    #[error("array schema at {path} needs a single `items` schema (tuple arrays are not supported)")]
    InvalidItems { path: String },

    #[error("`properties` at {path} must be an object")]
    InvalidProperties { path: String },

    #[error("invalid schema URI `{uri}`: {message}")]
    InvalidUri { uri: String, message: String },
}

/// Errors raised by triplification, objectification and type coercion.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("data at `{path}` does not match the schema: expected {expected}")]
    DataShape { path: String, expected: &'static str },

    #[error("failed to load statements for subject `{subject}`")]
    Load {
        subject: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot read `{text}` as {value_type}")]
    Coercion { value_type: String, text: String },

    #[error("unknown statement type tag `{0}`")]
    UnknownStatementType(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
