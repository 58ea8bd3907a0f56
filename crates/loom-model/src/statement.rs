//! Statements and the seams they flow through.
//!
//! The triplifier writes [`Statement`]s into a [`StatementSink`]; the
//! objectifier reads [`LoadedStatement`]s back through a [`StatementLoader`].
//! Storage lives behind those two traits.

use crate::typecast::{StatementType, ValueType};
use serde::{Deserialize, Serialize};

/// Reserved predicate of type assertions.
pub const TYPE_PREDICATE: &str = "type";

/// One `(subject, predicate, object, type)` fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    #[serde(rename = "type")]
    pub kind: StatementType,
}

impl Statement {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        kind: StatementType,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            kind,
        }
    }

    /// `subject` is an instance of the schema at `type_path`.
    pub fn type_assertion(subject: &str, type_path: &str) -> Self {
        Self::new(subject, TYPE_PREDICATE, type_path, StatementType::Type)
    }

    pub fn link(subject: &str, predicate: &str, target: &str) -> Self {
        Self::new(subject, predicate, target, StatementType::Link)
    }

    pub fn value(subject: &str, predicate: &str, text: String, value_type: ValueType) -> Self {
        Self::new(subject, predicate, text, StatementType::Value(value_type))
    }

    pub fn is_type_assertion(&self) -> bool {
        self.kind == StatementType::Type
    }
}

/// A property statement as a loader returns it: the subject is implied by
/// the lookup, the source tells where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedStatement {
    pub predicate: String,
    pub object: String,
    #[serde(rename = "type")]
    pub kind: StatementType,
    pub source: String,
}

impl LoadedStatement {
    pub fn new(
        predicate: impl Into<String>,
        object: impl Into<String>,
        kind: StatementType,
        source: impl Into<String>,
    ) -> Self {
        Self {
            predicate: predicate.into(),
            object: object.into(),
            kind,
            source: source.into(),
        }
    }
}

/// Receives statements as the triplifier produces them.
pub trait StatementSink {
    fn emit(&mut self, statement: Statement);
}

impl StatementSink for Vec<Statement> {
    fn emit(&mut self, statement: Statement) {
        self.push(statement);
    }
}

/// Property statements for a subject, in the order the store holds them.
pub trait StatementLoader {
    fn load(&self, subject: &str) -> anyhow::Result<Vec<LoadedStatement>>;
}

impl<F> StatementLoader for F
where
    F: Fn(&str) -> anyhow::Result<Vec<LoadedStatement>>,
{
    fn load(&self, subject: &str) -> anyhow::Result<Vec<LoadedStatement>> {
        self(subject)
    }
}
