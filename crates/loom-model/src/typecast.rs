//! Type coercion between JSON scalars and statement object text.
//!
//! Every statement object is a string. The statement's type tag records how
//! to read it back: [`infer`] picks the tag and the text on the way in,
//! [`parse`] reverses it on the way out.

use crate::error::{ModelError, ModelResult};
use crate::schema::{Primitive, ScalarSpec};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;

/// Semantic type of a scalar statement object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

impl ValueType {
    pub const ALL: [ValueType; 6] = [
        ValueType::String,
        ValueType::Integer,
        ValueType::Float,
        ValueType::Boolean,
        ValueType::Date,
        ValueType::DateTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Boolean => "boolean",
            ValueType::Date => "date",
            ValueType::DateTime => "datetime",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The type tag carried by every statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum StatementType {
    /// Type assertion: the object is a schema URI.
    Type,
    /// The object is another subject.
    Link,
    Value(ValueType),
}

impl StatementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementType::Type => "type",
            StatementType::Link => "link",
            StatementType::Value(value_type) => value_type.as_str(),
        }
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            StatementType::Value(value_type) => Some(*value_type),
            _ => None,
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementType {
    type Err = ModelError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "type" => Ok(StatementType::Type),
            "link" => Ok(StatementType::Link),
            other => ValueType::ALL
                .into_iter()
                .find(|value_type| value_type.as_str() == other)
                .map(StatementType::Value)
                .ok_or_else(|| ModelError::UnknownStatementType(other.to_string())),
        }
    }
}

impl From<StatementType> for String {
    fn from(kind: StatementType) -> Self {
        kind.as_str().to_string()
    }
}

impl TryFrom<String> for StatementType {
    type Error = ModelError;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        tag.parse()
    }
}

// ============================================================================
// Inference
// ============================================================================

/// Pick the type tag and object text for a scalar value.
///
/// `null` yields nothing. Strings are checked against what the schema
/// declares and keep their trimmed text when they parse; anything that does
/// not parse is kept verbatim as a `string`.
pub fn infer(spec: &ScalarSpec, value: &Value) -> Option<(ValueType, String)> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some((ValueType::Boolean, b.to_string())),
        Value::Number(n) => {
            let integral = n.is_i64() || n.is_u64();
            let value_type = if integral && spec.primitive != Some(Primitive::Number) {
                ValueType::Integer
            } else {
                ValueType::Float
            };
            Some((value_type, n.to_string()))
        }
        Value::String(text) => Some(infer_text(spec, text)),
        Value::Array(_) | Value::Object(_) => Some((ValueType::String, value.to_string())),
    }
}

fn infer_text(spec: &ScalarSpec, text: &str) -> (ValueType, String) {
    let trimmed = text.trim();
    let declared = match spec.format.as_deref() {
        Some("date") => normalize_date(trimmed).map(|d| (ValueType::Date, d)),
        Some("date-time") => normalize_datetime(trimmed).map(|d| (ValueType::DateTime, d)),
        _ => None,
    };
    let declared = declared.or_else(|| match spec.primitive {
        Some(Primitive::Integer) => trimmed
            .parse::<i64>()
            .ok()
            .map(|_| (ValueType::Integer, trimmed.to_string())),
        Some(Primitive::Number) => trimmed
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|_| (ValueType::Float, trimmed.to_string())),
        Some(Primitive::Boolean) => {
            parse_bool(trimmed).map(|b| (ValueType::Boolean, b.to_string()))
        }
        Some(Primitive::String) | None => None,
    });
    declared.unwrap_or_else(|| (ValueType::String, text.to_string()))
}

/// Loose boolean reading: `true/t/yes/y/1/on` and their negatives.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "on" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "off" => Some(false),
        _ => None,
    }
}

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%Y%m%d"];
const NAIVE_DATETIME_FORMATS: [&str; 3] =
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| parse_datetime(text).map(|dt| dt.date_naive()))
}

/// Timezone-less timestamps are read as UTC.
fn parse_datetime(text: &str) -> Option<DateTime<chrono::Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&chrono::Utc));
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// ISO 8601 calendar date (`2024-03-01`).
pub fn normalize_date(text: &str) -> Option<String> {
    parse_date(text).map(|d| d.format("%Y-%m-%d").to_string())
}

/// RFC 3339 timestamp in UTC (`2024-03-01T10:00:00Z`).
pub fn normalize_datetime(text: &str) -> Option<String> {
    parse_datetime(text).map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

// ============================================================================
// Parsing back
// ============================================================================

/// Read statement object text back into native JSON. Dates stay strings
/// once validated.
pub fn parse(value_type: ValueType, text: &str) -> ModelResult<Value> {
    let fail = || ModelError::Coercion {
        value_type: value_type.to_string(),
        text: text.to_string(),
    };
    let trimmed = text.trim();
    match value_type {
        ValueType::String => Ok(Value::String(text.to_string())),
        ValueType::Integer => trimmed
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| fail()),
        ValueType::Float => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(fail),
        ValueType::Boolean => parse_bool(trimmed).map(Value::Bool).ok_or_else(fail),
        ValueType::Date => parse_date(trimmed)
            .map(|_| Value::String(trimmed.to_string()))
            .ok_or_else(fail),
        ValueType::DateTime => parse_datetime(trimmed)
            .map(|_| Value::String(trimmed.to_string()))
            .ok_or_else(fail),
    }
}
