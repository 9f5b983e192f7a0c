//! Error types for DocModel operations.

use std::fmt;

/// The primary error type for all DocModel operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// `get` matched zero documents
    DoesNotExist(String),
    /// `get` matched more than one document
    MultipleObjectsReturned(String),
    /// Field-level validation failed during save
    Validation(ValidationError),
    /// Malformed filter expression (unknown field or operator)
    Queryset(QuerysetError),
    /// A `Protected` on-delete policy refused a cascade
    Protected(ProtectedError),
    /// Misconfiguration (unknown database alias, unresolved registry)
    Settings(SettingsError),
    /// Schema error raised at registration time
    Schema(SchemaError),
    /// Store-native error, propagated unwrapped
    Store(StoreError),
    /// Operation was cancelled via asupersync
    Cancelled,
}

/// Validation error for field values.
///
/// `is_subfield` is set when the failing value was an element nested inside a
/// list field, so error messages can indicate provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    pub is_subfield: bool,
}

/// Malformed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerysetError {
    pub message: String,
}

/// A delete was refused because a related field is protected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedError {
    /// Model owning the protected relation field
    pub model: String,
    /// Name of the protected relation field
    pub field: String,
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsError {
    pub message: String,
}

/// Schema error raised while registering model definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Model name registered twice
    DuplicateModel,
    /// Collection name already used by another model
    DuplicateCollection,
    /// Field name clashes with reserved syntax (`__`, `_id`)
    ReservedFieldName,
    /// Relation target never registered
    UnknownRelationTarget,
    /// Related name collides with an existing field
    DuplicateRelatedName,
    /// Model not present in the registry
    UnknownModel,
    /// Invalid declared index
    InvalidIndex,
}

/// Store-native error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Unique-constraint violation
    DuplicateKey,
    /// Connection-level failure
    Connection,
    /// Any other store failure
    Other,
}

impl Error {
    pub fn validation(message: impl Into<String>, is_subfield: bool) -> Self {
        Error::Validation(ValidationError {
            message: message.into(),
            is_subfield,
        })
    }

    pub fn queryset(message: impl Into<String>) -> Self {
        Error::Queryset(QuerysetError {
            message: message.into(),
        })
    }

    pub fn settings(message: impl Into<String>) -> Self {
        Error::Settings(SettingsError {
            message: message.into(),
        })
    }

    pub fn schema(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        Error::Schema(SchemaError {
            kind,
            message: message.into(),
        })
    }

    pub fn store(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Error::Store(StoreError {
            kind,
            message: message.into(),
        })
    }

    /// Check whether this is a duplicate-key store error.
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(
            self,
            Error::Store(StoreError {
                kind: StoreErrorKind::DuplicateKey,
                ..
            })
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DoesNotExist(model) => {
                write!(f, "{model} matching query does not exist")
            }
            Error::MultipleObjectsReturned(model) => {
                write!(f, "get() returned more than one {model} document")
            }
            Error::Validation(e) => write!(f, "{e}"),
            Error::Queryset(e) => write!(f, "{}", e.message),
            Error::Protected(e) => write!(
                f,
                "cannot delete: field `{}` of model `{}` is protected",
                e.field, e.model
            ),
            Error::Settings(e) => write!(f, "{}", e.message),
            Error::Schema(e) => write!(f, "{}", e.message),
            Error::Store(e) => write!(f, "store error: {}", e.message),
            Error::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_subfield {
            write!(f, "{} (Sub-field exception)", self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for Error {}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subfield_flag_changes_message() {
        let plain = Error::validation("Field `docs` has wrong type! Expected list", false);
        let nested = Error::validation("Field `docs` has wrong type! Expected int", true);
        assert!(!plain.to_string().contains("Sub-field"));
        assert!(nested.to_string().contains("(Sub-field exception)"));
    }

    #[test]
    fn test_is_duplicate_key() {
        let err = Error::store(StoreErrorKind::DuplicateKey, "dup");
        assert!(err.is_duplicate_key());
        assert!(!Error::Cancelled.is_duplicate_key());
    }

    #[test]
    fn test_does_not_exist_display() {
        let err = Error::DoesNotExist("User".to_string());
        assert_eq!(err.to_string(), "User matching query does not exist");
    }
}
