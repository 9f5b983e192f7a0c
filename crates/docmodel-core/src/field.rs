//! Field descriptors: the schema-level declaration of one model attribute.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::Value;

/// Which save path a value is being prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAction {
    /// First insert of a document
    Create,
    /// Partial update of an existing document
    Update,
}

/// Action applied to referencing documents when the referenced document is
/// deleted.
///
/// A relation field with *no* policy configured is left untouched on parent
/// deletion: unset means "no cascade action at all", not a default cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// Delete every referencing document
    Cascade,
    /// Refuse to delete the referenced document
    Protected,
    /// Set the foreign-key field to null
    SetNull,
    /// Set the foreign-key field to its configured default
    SetDefault,
}

/// Shape of a relation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Many referencing documents per referenced document
    ForeignKey,
    /// At most one referencing document (implies unique)
    OneToOne,
}

/// Relation target, resolved in two phases: every target starts `Pending`
/// (a model name) and is flipped to `Resolved` by the registry once all
/// models are registered. Self-referential and child-before-parent
/// declarations are legal because nothing is looked up until resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationTarget {
    /// Named target, not yet checked against the registry
    Pending(String),
    /// Registered model name
    Resolved(String),
}

impl RelationTarget {
    /// The target model name regardless of resolution state.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            RelationTarget::Pending(name) | RelationTarget::Resolved(name) => name,
        }
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, RelationTarget::Resolved(_))
    }
}

/// Relation-specific configuration carried by relation fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDescriptor {
    pub target: RelationTarget,
    pub kind: RelationKind,
    /// Name under which the backward relation is installed on the target;
    /// defaults to `{collection}_set` of the owning model.
    pub related_name: Option<String>,
    pub on_delete: Option<OnDelete>,
}

/// Semantic kind of a field, with kind-specific configuration inline.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Bool,
    String,
    Integer,
    Float,
    /// List of values, optionally validated element-wise against a child
    /// descriptor.
    List { child: Option<Box<FieldDescriptor>> },
    Dict,
    DateTime {
        /// Stamp the current time when the field is empty on create
        auto_now_create: bool,
        /// Stamp the current time on every update
        auto_now_update: bool,
    },
    Relation(RelationDescriptor),
}

impl FieldKind {
    /// Human-readable kind name used in validation messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::String => "string",
            FieldKind::Integer => "int",
            FieldKind::Float => "float",
            FieldKind::List { .. } => "list",
            FieldKind::Dict => "dict",
            FieldKind::DateTime { .. } => "datetime",
            FieldKind::Relation(_) => "relation",
        }
    }
}

/// Default value for a field: a literal, a zero-arg producer, or an
/// asynchronous zero-arg producer.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Producer(Arc<dyn Fn() -> Value + Send + Sync>),
    AsyncProducer(Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Value> + Send>> + Send + Sync>),
}

impl DefaultValue {
    /// Resolve the default, invoking and awaiting producers as needed.
    pub async fn resolve(&self) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Producer(f) => f(),
            DefaultValue::AsyncProducer(f) => f().await,
        }
    }
}

impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DefaultValue::Value(a), DefaultValue::Value(b)) => a == b,
            // Producers have no meaningful equality.
            _ => false,
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            DefaultValue::Producer(_) => f.write_str("Producer(..)"),
            DefaultValue::AsyncProducer(_) => f.write_str("AsyncProducer(..)"),
        }
    }
}

/// Choices configuration: pairs of (stored key, display label).
#[derive(Debug, Clone, PartialEq)]
pub struct Choices {
    pairs: Vec<(Value, String)>,
}

impl Choices {
    #[must_use]
    pub fn new<L: Into<String>>(pairs: impl IntoIterator<Item = (Value, L)>) -> Self {
        Self {
            pairs: pairs.into_iter().map(|(k, l)| (k, l.into())).collect(),
        }
    }

    /// Map a raw value to its stored key: a display label maps to its key, a
    /// stored key passes through, anything else is an unknown choice.
    pub fn stored_key(&self, raw: &Value) -> Result<Value> {
        if let Value::String(label) = raw {
            if let Some((key, _)) = self.pairs.iter().find(|(_, l)| l == label) {
                return Ok(key.clone());
            }
        }
        if self.pairs.iter().any(|(key, _)| key == raw) {
            return Ok(raw.clone());
        }
        Err(Error::validation(
            format!("The value '{raw:?}' is not specified in the 'choices' attribute."),
            false,
        ))
    }

    /// Map a stored key to its display label.
    pub fn label(&self, stored: &Value) -> Result<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == stored)
            .map(|(_, label)| label.as_str())
            .ok_or_else(|| {
                Error::validation(
                    format!(
                        "The value '{stored:?}' is not specified in the 'choices' attribute."
                    ),
                    false,
                )
            })
    }
}

/// Schema-level declaration of one model attribute.
///
/// Built with chained setters, teacher-style:
///
/// ```
/// use docmodel_core::field::{FieldDescriptor, OnDelete};
///
/// let username = FieldDescriptor::string().max_length(20).null(false);
/// let author = FieldDescriptor::foreign_key("User").on_delete(OnDelete::Cascade);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub kind: FieldKind,
    /// `true` means the field is nullable. A non-nullable field with an
    /// absent value fails validation unless a default resolves one.
    pub null: bool,
    /// Whether an empty string is accepted
    pub blank: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub unique: bool,
    /// Secondary-index hint consumed by index reconciliation
    pub index: bool,
    pub default: Option<DefaultValue>,
    pub choices: Option<Choices>,
}

impl FieldDescriptor {
    fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            null: true,
            blank: true,
            min_length: None,
            max_length: None,
            unique: false,
            index: false,
            default: None,
            choices: None,
        }
    }

    #[must_use]
    pub fn boolean() -> Self {
        Self::new(FieldKind::Bool)
    }

    #[must_use]
    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    #[must_use]
    pub fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    #[must_use]
    pub fn float() -> Self {
        Self::new(FieldKind::Float)
    }

    #[must_use]
    pub fn list() -> Self {
        Self::new(FieldKind::List { child: None })
    }

    /// List field whose elements are validated against `child`.
    #[must_use]
    pub fn list_of(child: FieldDescriptor) -> Self {
        Self::new(FieldKind::List {
            child: Some(Box::new(child)),
        })
    }

    #[must_use]
    pub fn dict() -> Self {
        Self::new(FieldKind::Dict)
    }

    #[must_use]
    pub fn datetime() -> Self {
        Self::new(FieldKind::DateTime {
            auto_now_create: false,
            auto_now_update: false,
        })
    }

    /// Many-to-one relation to `target` (a model name; forward declarations
    /// are fine, they stay `Pending` until registry resolution).
    #[must_use]
    pub fn foreign_key(target: impl Into<String>) -> Self {
        Self::new(FieldKind::Relation(RelationDescriptor {
            target: RelationTarget::Pending(target.into()),
            kind: RelationKind::ForeignKey,
            related_name: None,
            on_delete: None,
        }))
    }

    /// One-to-one relation to `target`. Implies `unique`.
    #[must_use]
    pub fn one_to_one(target: impl Into<String>) -> Self {
        let mut field = Self::new(FieldKind::Relation(RelationDescriptor {
            target: RelationTarget::Pending(target.into()),
            kind: RelationKind::OneToOne,
            related_name: None,
            on_delete: None,
        }));
        field.unique = true;
        field
    }

    #[must_use]
    pub fn null(mut self, value: bool) -> Self {
        self.null = value;
        self
    }

    #[must_use]
    pub fn blank(mut self, value: bool) -> Self {
        self.blank = value;
        self
    }

    #[must_use]
    pub fn min_length(mut self, value: usize) -> Self {
        self.min_length = Some(value);
        self
    }

    #[must_use]
    pub fn max_length(mut self, value: usize) -> Self {
        self.max_length = Some(value);
        self
    }

    #[must_use]
    pub fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    #[must_use]
    pub fn index(mut self, value: bool) -> Self {
        self.index = value;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    /// Default produced by a zero-arg closure at resolve time.
    #[must_use]
    pub fn default_with(mut self, producer: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Producer(Arc::new(producer)));
        self
    }

    /// Default produced by an asynchronous zero-arg closure.
    #[must_use]
    pub fn default_async<F, Fut>(mut self, producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        self.default = Some(DefaultValue::AsyncProducer(Arc::new(move || {
            Box::pin(producer())
        })));
        self
    }

    #[must_use]
    pub fn choices(mut self, pairs: impl IntoIterator<Item = (Value, &'static str)>) -> Self {
        self.choices = Some(Choices::new(pairs));
        self
    }

    /// Stamp the current time when the field is empty on create.
    #[must_use]
    pub fn auto_now_create(mut self) -> Self {
        if let FieldKind::DateTime {
            auto_now_create, ..
        } = &mut self.kind
        {
            *auto_now_create = true;
        }
        self
    }

    /// Stamp the current time on every update.
    #[must_use]
    pub fn auto_now_update(mut self) -> Self {
        if let FieldKind::DateTime {
            auto_now_update, ..
        } = &mut self.kind
        {
            *auto_now_update = true;
        }
        self
    }

    /// Set the backward-relation name installed on the relation target.
    #[must_use]
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        if let FieldKind::Relation(rel) = &mut self.kind {
            rel.related_name = Some(name.into());
        }
        self
    }

    /// Set the on-delete policy for a relation field.
    #[must_use]
    pub fn on_delete(mut self, policy: OnDelete) -> Self {
        if let FieldKind::Relation(rel) = &mut self.kind {
            rel.on_delete = Some(policy);
        }
        self
    }

    /// Relation configuration, if this is a relation field.
    #[must_use]
    pub fn relation(&self) -> Option<&RelationDescriptor> {
        match &self.kind {
            FieldKind::Relation(rel) => Some(rel),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_relation(&self) -> bool {
        matches!(self.kind, FieldKind::Relation(_))
    }

    /// Encode an external value into its stored form. Relation values become
    /// [`Value::Reference`] wrappers pointing at `collection`.
    #[must_use]
    pub fn to_internal_value(&self, value: Value, collection: &str) -> Value {
        match &self.kind {
            FieldKind::Relation(_) if !value.is_null() => Value::Reference {
                collection: collection.to_string(),
                id: Box::new(value.reference_id().clone()),
            },
            _ => value,
        }
    }

    /// Decode a stored value into its external form. References decode to the
    /// bare identifier.
    #[must_use]
    pub fn to_external_value(&self, value: Value) -> Value {
        match value {
            Value::Reference { id, .. } => *id,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let field = FieldDescriptor::string()
            .max_length(20)
            .min_length(2)
            .null(false)
            .blank(false)
            .unique(true)
            .index(true);

        assert_eq!(field.kind, FieldKind::String);
        assert_eq!(field.max_length, Some(20));
        assert_eq!(field.min_length, Some(2));
        assert!(!field.null);
        assert!(!field.blank);
        assert!(field.unique);
        assert!(field.index);
    }

    #[test]
    fn test_one_to_one_implies_unique() {
        let field = FieldDescriptor::one_to_one("User");
        assert!(field.unique);
        assert_eq!(
            field.relation().map(|r| r.kind),
            Some(RelationKind::OneToOne)
        );
    }

    #[test]
    fn test_relation_starts_pending() {
        let field = FieldDescriptor::foreign_key("User").on_delete(OnDelete::Cascade);
        let rel = field.relation().unwrap();
        assert_eq!(rel.target, RelationTarget::Pending("User".to_string()));
        assert_eq!(rel.on_delete, Some(OnDelete::Cascade));
    }

    #[test]
    fn test_choices_label_to_stored_key() {
        let choices = Choices::new([(Value::Int(1), "a"), (Value::Int(2), "b")]);
        assert_eq!(choices.stored_key(&Value::from("a")), Ok(Value::Int(1)));
        assert_eq!(choices.stored_key(&Value::Int(2)), Ok(Value::Int(2)));
        assert!(choices.stored_key(&Value::Int(3)).is_err());
    }

    #[test]
    fn test_choices_display_label() {
        let choices = Choices::new([(Value::Int(1), "a"), (Value::Int(2), "b")]);
        assert_eq!(choices.label(&Value::Int(1)), Ok("a"));
        assert!(choices.label(&Value::Int(9)).is_err());
    }

    #[test]
    fn test_internal_external_round_trip_for_plain_fields() {
        let field = FieldDescriptor::integer();
        let v = Value::Int(5);
        let round_tripped =
            field.to_external_value(field.to_internal_value(v.clone(), "ignored"));
        assert_eq!(round_tripped, v);
    }

    #[test]
    fn test_relation_internal_form_is_reference() {
        let field = FieldDescriptor::foreign_key("User");
        let internal = field.to_internal_value(Value::Int(7), "user");
        assert_eq!(
            internal,
            Value::Reference {
                collection: "user".to_string(),
                id: Box::new(Value::Int(7)),
            }
        );
        // External form is the dereferenced identifier, not the wrapper.
        assert_eq!(field.to_external_value(internal), Value::Int(7));
    }

    #[test]
    fn test_null_relation_stays_null_internally() {
        let field = FieldDescriptor::foreign_key("User");
        assert_eq!(field.to_internal_value(Value::Null, "user"), Value::Null);
    }
}
