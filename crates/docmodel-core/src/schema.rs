//! Model definitions and resolved schemas.
//!
//! There is no metaclass magic here: applications describe each model once
//! with a [`ModelDef`] builder at process init and hand it to the registry,
//! which turns it into an immutable [`ModelSchema`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::document::ID_FIELD;
use crate::error::{Error, Result, SchemaErrorKind};
use crate::field::{FieldDescriptor, RelationKind};
use crate::index::IndexSpec;
use crate::value::Value;

/// Custom per-field validator: receives the already-validated value and may
/// return a replacement.
pub type FieldValidatorFn = Arc<dyn Fn(&Value) -> Result<Option<Value>> + Send + Sync>;

/// Derive a collection name from a CamelCase model name: `UserProfile` →
/// `user_profile`. Names without CamelCase humps are lowercased as-is.
#[must_use]
pub fn derive_collection_name(model_name: &str) -> String {
    // The pattern is infallible; compile inline rather than caching, this
    // runs once per model at registration.
    let Ok(humps) = Regex::new(r"[A-Z][^A-Z]*") else {
        return model_name.to_lowercase();
    };
    let parts: Vec<String> = humps
        .find_iter(model_name)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    if parts.is_empty() {
        model_name.to_lowercase()
    } else {
        parts.join("_")
    }
}

/// Builder for one model declaration.
#[derive(Clone)]
pub struct ModelDef {
    pub(crate) name: String,
    pub(crate) collection: Option<String>,
    pub(crate) db_alias: String,
    pub(crate) sorting: Vec<String>,
    pub(crate) is_abstract: bool,
    pub(crate) fields: Vec<(String, FieldDescriptor)>,
    pub(crate) validators: BTreeMap<String, FieldValidatorFn>,
    pub(crate) indexes: Vec<IndexSpec>,
}

impl ModelDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            db_alias: "default".to_string(),
            sorting: Vec::new(),
            is_abstract: false,
            fields: Vec::new(),
            validators: BTreeMap::new(),
            indexes: Vec::new(),
        }
    }

    /// Override the collection name derived from the model name.
    #[must_use]
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Select the database alias this model dispatches to.
    #[must_use]
    pub fn db(mut self, alias: impl Into<String>) -> Self {
        self.db_alias = alias.into();
        self
    }

    /// Default ordering, `"-field"` for descending.
    #[must_use]
    pub fn sorting<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.sorting = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Mark this definition abstract: it is excluded from registration and
    /// dispatch entirely.
    #[must_use]
    pub fn abstract_model(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Declare a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.push((name.into(), descriptor));
        self
    }

    /// Register a custom validator for `field`, invoked after the standard
    /// pipeline with the validated value.
    #[must_use]
    pub fn validate_with(
        mut self,
        field: impl Into<String>,
        validator: impl Fn(&Value) -> Result<Option<Value>> + Send + Sync + 'static,
    ) -> Self {
        self.validators.insert(field.into(), Arc::new(validator));
        self
    }

    /// Declare a composite index.
    #[must_use]
    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub(crate) fn check_field_names(&self) -> Result<()> {
        for (name, _) in &self.fields {
            if name.contains("__") {
                return Err(Error::schema(
                    SchemaErrorKind::ReservedFieldName,
                    format!("You can not use `__` in the field name {name}"),
                ));
            }
            if name == ID_FIELD {
                return Err(Error::schema(
                    SchemaErrorKind::ReservedFieldName,
                    format!("Field name `{ID_FIELD}` is reserved for the store identifier"),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("db_alias", &self.db_alias)
            .field("is_abstract", &self.is_abstract)
            .field("fields", &self.fields.len())
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// Shape of a synthesized backward relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackwardKind {
    /// Filter-many reverse view of a foreign key
    ForeignKey,
    /// Get-one reverse view of a one-to-one
    OneToOne,
}

impl From<RelationKind> for BackwardKind {
    fn from(kind: RelationKind) -> Self {
        match kind {
            RelationKind::ForeignKey => BackwardKind::ForeignKey,
            RelationKind::OneToOne => BackwardKind::OneToOne,
        }
    }
}

/// A synthesized, non-stored reverse view of a relation field, installed on
/// the relation target by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackwardDescriptor {
    /// Model owning the forward relation field
    pub model: String,
    /// Name of the forward relation field on that model
    pub field_name: String,
    pub kind: BackwardKind,
}

/// A registered, resolved model schema. Immutable once the registry has
/// finished [`resolve_relations`](crate::registry::ModelRegistry::resolve_relations).
#[derive(Clone)]
pub struct ModelSchema {
    pub(crate) name: String,
    pub(crate) collection: String,
    pub(crate) db_alias: String,
    pub(crate) sorting: Vec<String>,
    pub(crate) fields: Vec<(String, FieldDescriptor)>,
    pub(crate) validators: BTreeMap<String, FieldValidatorFn>,
    pub(crate) indexes: Vec<IndexSpec>,
    pub(crate) backwards: Vec<(String, BackwardDescriptor)>,
    pub(crate) has_backwards: bool,
}

impl ModelSchema {
    pub(crate) fn from_def(def: ModelDef) -> Self {
        let collection = def
            .collection
            .clone()
            .unwrap_or_else(|| derive_collection_name(&def.name));
        Self {
            name: def.name,
            collection,
            db_alias: def.db_alias,
            sorting: def.sorting,
            fields: def.fields,
            validators: def.validators,
            indexes: def.indexes,
            backwards: Vec::new(),
            has_backwards: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn db_alias(&self) -> &str {
        &self.db_alias
    }

    /// Default ordering keys (`"-field"` for descending).
    #[must_use]
    pub fn sorting(&self) -> &[String] {
        &self.sorting
    }

    /// Whether any registered model points a relation field at this one.
    /// Gates the cascade engine: models nothing references skip it entirely.
    #[must_use]
    pub fn has_backwards(&self) -> bool {
        self.has_backwards
    }

    /// Look up a declared field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, descriptor)| descriptor)
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields.iter().map(|(n, d)| (n.as_str(), d))
    }

    /// Look up an installed backward relation by related name.
    #[must_use]
    pub fn backward(&self, related_name: &str) -> Option<&BackwardDescriptor> {
        self.backwards
            .iter()
            .find(|(name, _)| name == related_name)
            .map(|(_, descriptor)| descriptor)
    }

    /// Installed backward relations in installation order.
    pub fn backwards(&self) -> impl Iterator<Item = (&str, &BackwardDescriptor)> {
        self.backwards.iter().map(|(n, d)| (n.as_str(), d))
    }

    /// Custom validator for `field`, if registered.
    #[must_use]
    pub fn validator(&self, field: &str) -> Option<&FieldValidatorFn> {
        self.validators.get(field)
    }

    /// Declared composite indexes (per-field hints are collected separately
    /// by index reconciliation).
    #[must_use]
    pub fn declared_indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("db_alias", &self.db_alias)
            .field("fields", &self.fields.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field(
                "backwards",
                &self.backwards.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("has_backwards", &self.has_backwards)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_collection_name() {
        assert_eq!(derive_collection_name("User"), "user");
        assert_eq!(derive_collection_name("UserProfile"), "user_profile");
        assert_eq!(derive_collection_name("plain"), "plain");
    }

    #[test]
    fn test_collection_override() {
        let schema = ModelSchema::from_def(
            ModelDef::new("User").collection_name("rel_user"),
        );
        assert_eq!(schema.collection(), "rel_user");
    }

    #[test]
    fn test_reserved_field_names_rejected() {
        let def = ModelDef::new("User").field("user__name", FieldDescriptor::string());
        assert!(def.check_field_names().is_err());

        let def = ModelDef::new("User").field("_id", FieldDescriptor::string());
        assert!(def.check_field_names().is_err());
    }

    #[test]
    fn test_field_lookup_preserves_declaration_order() {
        let schema = ModelSchema::from_def(
            ModelDef::new("Profile")
                .field("username", FieldDescriptor::string())
                .field("age", FieldDescriptor::integer()),
        );
        let names: Vec<&str> = schema.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["username", "age"]);
        assert!(schema.field("age").is_some());
        assert!(schema.field("missing").is_none());
    }
}
