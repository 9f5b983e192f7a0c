//! Dynamic document values.

use serde::{Deserialize, Serialize};

use crate::document::Document;

/// A dynamically-typed document value.
///
/// This enum represents every value shape the mapper can store or filter on.
/// It is used for field values, compiled filters, and raw documents alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null / absent value
    Null,

    /// Boolean value
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit floating point
    Float(f64),

    /// UTF-8 string
    String(String),

    /// Timestamp (whole seconds since epoch).
    ///
    /// The store rounds sub-second precision, so the mapper never stores
    /// anything finer than a second.
    DateTime(i64),

    /// Ordered list of values
    List(Vec<Value>),

    /// Nested document
    Document(Document),

    /// Internal form of a relation value: the referenced collection plus the
    /// identifier of the referenced document. The external form is the bare
    /// identifier.
    Reference {
        /// Collection holding the referenced document
        collection: String,
        /// Identifier of the referenced document
        id: Box<Value>,
    },
}

impl Value {
    /// Check if this value is null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
            Value::Document(_) => "document",
            Value::Reference { .. } => "reference",
        }
    }

    /// Current timestamp, truncated to whole seconds.
    #[must_use]
    pub fn now() -> Self {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);
        Value::DateTime(secs)
    }

    /// Try to convert this value to a bool.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to convert this value to an i64.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) | Value::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to convert this value to an f64.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to view this value as a string slice.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Try to view this value as a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Try to view this value as a nested document.
    #[must_use]
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(v) => Some(v),
            _ => None,
        }
    }

    /// Length of a length-bearing value (string, list, or document).
    #[must_use]
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::String(v) => Some(v.chars().count()),
            Value::List(v) => Some(v.len()),
            Value::Document(v) => Some(v.len()),
            _ => None,
        }
    }

    /// Unwrap a reference to the identifier it points at.
    ///
    /// Non-reference values are returned unchanged: callers may already hold
    /// the bare identifier.
    #[must_use]
    pub fn reference_id(&self) -> &Value {
        match self {
            Value::Reference { id, .. } => id.as_ref(),
            other => other,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Document(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Int(1).type_name(), "int");
        assert_eq!(Value::from("x").type_name(), "string");
        let reference = Value::Reference {
            collection: "user".to_string(),
            id: Box::new(Value::Int(1)),
        };
        assert_eq!(reference.type_name(), "reference");
    }

    #[test]
    fn test_now_is_whole_seconds() {
        let Value::DateTime(secs) = Value::now() else {
            panic!("now() must be a datetime");
        };
        // Sanity: after 2020-01-01.
        assert!(secs > 1_577_836_800);
    }

    #[test]
    fn test_reference_id_unwraps() {
        let reference = Value::Reference {
            collection: "user".to_string(),
            id: Box::new(Value::Int(7)),
        };
        assert_eq!(reference.reference_id(), &Value::Int(7));
        assert_eq!(Value::Int(7).reference_id(), &Value::Int(7));
    }

    #[test]
    fn test_length() {
        assert_eq!(Value::from("test").length(), Some(4));
        assert_eq!(Value::List(vec![Value::Int(1)]).length(), Some(1));
        assert_eq!(Value::Int(1).length(), None);
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::Float(3.5).as_i64(), None);
    }
}
