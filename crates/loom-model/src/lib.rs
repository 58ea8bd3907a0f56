//! Loom statement model
//!
//! Maps schema-shaped objects into `(subject, predicate, object, type)`
//! statements and rebuilds bounded-depth objects from them:
//!
//! ```text
//!   record ──► nested object ──► Triplifier ──► statements ──► store
//!                                                               │
//!   entity ◄──────────────── Objectifier ◄──── loader ◄─────────┘
//! ```
//!
//! ## Pieces
//!
//! - [`SchemaRegistry`] compiles annotated JSON schemas (`rdfSubject`,
//!   `rdfName`, `rdfReverse`) into arenas; [`Binding`] walks them.
//! - [`Triplifier`] decomposes data into [`Statement`]s.
//! - [`Objectifier`] reads [`LoadedStatement`]s back through a
//!   [`StatementLoader`] and rebuilds objects.
//! - [`subject`] names objects; [`typecast`] converts scalars to and from
//!   statement text.
//!
//! Nothing here does I/O. Storage lives behind [`StatementSink`] and
//! [`StatementLoader`].

pub mod binding;
pub mod error;
pub mod objectify;
pub mod schema;
pub mod statement;
pub mod subject;
pub mod triplify;
pub mod typecast;

pub use binding::Binding;
pub use error::{ModelError, ModelResult, SchemaError};
pub use objectify::{MergePolicy, Objectifier, SCHEMA_KEY, SOURCES_KEY};
pub use schema::{Primitive, ScalarSpec, Schema, SchemaKind, SchemaRegistry, DEFAULT_SUBJECT_FIELD};
pub use statement::{LoadedStatement, Statement, StatementLoader, StatementSink, TYPE_PREDICATE};
pub use subject::{make_id, SubjectPolicy};
pub use triplify::Triplifier;
pub use typecast::{StatementType, ValueType};
