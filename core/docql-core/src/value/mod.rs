//! Value model — 문서 데이터베이스의 타입 시스템
//!
//! Every stored datum is a [`Value`]: a closed tagged union matched
//! exhaustively at every compare / encode / decode site. Documents are
//! field-ordered containers of values ([`Document`]) addressed by [`Path`].

pub mod cast;
pub mod compare;
pub mod document;
pub mod json;
pub mod path;

pub use document::Document;
pub use path::{Path, PathFragment};

use std::fmt;

use serde::Deserialize;

/// Discriminant of a [`Value`], also used for declared column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Null,
    Bool,
    Integer,
    Double,
    Text,
    Blob,
    Array,
    Document,
}

impl ValueType {
    /// Integer and double share one ordering domain.
    pub fn is_number(self) -> bool {
        matches!(self, ValueType::Integer | ValueType::Double)
    }

    /// Name used in DDL (`CREATE TABLE t(a INTEGER)`).
    pub fn sql_name(self) -> &'static str {
        match self {
            ValueType::Null => "NULL",
            ValueType::Bool => "BOOL",
            ValueType::Integer => "INTEGER",
            ValueType::Double => "DOUBLE",
            ValueType::Text => "TEXT",
            ValueType::Blob => "BLOB",
            ValueType::Array => "ARRAY",
            ValueType::Document => "DOCUMENT",
        }
    }

    /// Resolves a type keyword, `None` when the word is not a type.
    pub fn from_sql_name(name: &str) -> Option<Self> {
        let t = match name.to_ascii_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => ValueType::Bool,
            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "MEDIUMINT" | "INT2"
            | "INT8" => ValueType::Integer,
            "DOUBLE" | "REAL" | "FLOAT" => ValueType::Double,
            "TEXT" | "VARCHAR" | "CHARACTER" | "CHAR" => ValueType::Text,
            "BLOB" | "BYTES" => ValueType::Blob,
            "ARRAY" => ValueType::Array,
            "DOCUMENT" => ValueType::Document,
            _ => return None,
        };
        Some(t)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Integer => "integer",
            ValueType::Double => "double",
            ValueType::Text => "text",
            ValueType::Blob => "blob",
            ValueType::Array => "array",
            ValueType::Document => "document",
        };
        f.write_str(name)
    }
}

/// A typed, possibly nested value.
///
/// Equality and ordering follow the total order of the key encoding:
/// `null < bool < number < text < blob < array < document`, with integers
/// and doubles compared numerically (see [`compare`]).
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Integer(_) => ValueType::Integer,
            Value::Double(_) => ValueType::Double,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
            Value::Array(_) => ValueType::Array,
            Value::Document(_) => ValueType::Document,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// SQL truthiness: `NULL`, `false`, zero, and empty containers are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Double(d) => *d != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Blob(b) => !b.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Document(d) => !d.is_empty(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Double(d) if d.fract() == 0.0 && d.abs() < 9.2e18 => Some(*d as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Walks `fragments` through nested documents and arrays.
    pub fn get_path(&self, fragments: &[PathFragment]) -> Option<&Value> {
        let Some((first, rest)) = fragments.split_first() else {
            return Some(self);
        };
        let child = match (self, first) {
            (Value::Document(d), PathFragment::Field(name)) => d.get(name)?,
            (Value::Array(a), PathFragment::Index(i)) => a.get(*i)?,
            _ => return None,
        };
        child.get_path(rest)
    }
}

// ════════════════════════════════════════
// Conversions
// ════════════════════════════════════════

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Document(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ════════════════════════════════════════
// SQL literal rendering
// ════════════════════════════════════════

/// Renders the value as a re-parseable SQL literal.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Double(d) => write_double(f, *d),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Blob(b) => {
                f.write_str("x'")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("'")
            }
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Document(doc) => write!(f, "{doc}"),
        }
    }
}

pub(crate) fn write_double(f: &mut fmt::Formatter<'_>, d: f64) -> fmt::Result {
    if d.is_finite() && d.fract() == 0.0 && d.abs() < 1e16 {
        write!(f, "{d:.1}")
    } else {
        write!(f, "{d}")
    }
}
