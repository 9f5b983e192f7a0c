//! Index reconciliation: diff declared indexes against the store.

use asupersync::{Cx, Outcome};

use crate::dispatcher::{Dispatcher, SortOrder};
use crate::document::ID_FIELD;
use crate::error::Error;
use crate::schema::ModelSchema;

/// Declarative description of one index: a key set plus a uniqueness flag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexSpec {
    pub keys: Vec<(String, SortOrder)>,
    pub unique: bool,
}

impl IndexSpec {
    #[must_use]
    pub fn new<F: Into<String>>(
        keys: impl IntoIterator<Item = (F, SortOrder)>,
        unique: bool,
    ) -> Self {
        Self {
            keys: keys.into_iter().map(|(f, o)| (f.into(), o)).collect(),
            unique,
        }
    }

    /// Single ascending key.
    #[must_use]
    pub fn ascending(field: impl Into<String>, unique: bool) -> Self {
        Self::new([(field.into(), SortOrder::Ascending)], unique)
    }

    /// Whether this is the store's implicit primary-identifier index, which
    /// reconciliation must never create or drop.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.keys.len() == 1 && self.keys[0].0 == ID_FIELD
    }
}

/// Changes applied by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexChanges {
    pub created: Vec<IndexSpec>,
    pub dropped: Vec<IndexSpec>,
}

/// Indexes a model declares: the explicit composite list plus one ascending
/// single-field index per `unique`/`index` field hint.
#[must_use]
pub fn declared_indexes(schema: &ModelSchema) -> Vec<IndexSpec> {
    let mut indexes = schema.declared_indexes().to_vec();

    for (name, field) in schema.fields() {
        if field.unique || field.index {
            indexes.push(IndexSpec::ascending(name, field.unique));
        }
    }

    indexes
}

/// Reconcile the store's index set with the model's declared set: create the
/// missing ones, drop the extras, and leave the primary index alone.
#[tracing::instrument(level = "debug", skip(cx, schema, dispatcher), fields(model = schema.name()))]
pub async fn reconcile(
    cx: &Cx,
    schema: &ModelSchema,
    dispatcher: &dyn Dispatcher,
) -> Outcome<IndexChanges, Error> {
    let declared = declared_indexes(schema);

    let existing = match dispatcher.list_indexes(cx).await {
        Outcome::Ok(indexes) => indexes,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    let mut changes = IndexChanges::default();

    for index in existing.iter().filter(|i| !i.is_primary()) {
        if !declared.contains(index) {
            match dispatcher.drop_index(cx, index).await {
                Outcome::Ok(()) => {
                    tracing::info!(model = schema.name(), ?index, "Index removed");
                    changes.dropped.push(index.clone());
                }
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
    }

    for index in declared.iter().filter(|i| !i.is_primary()) {
        if !existing.contains(index) {
            match dispatcher.create_index(cx, index).await {
                Outcome::Ok(()) => {
                    tracing::info!(
                        model = schema.name(),
                        ?index,
                        compound = index.keys.len() > 1,
                        unique = index.unique,
                        "Index created"
                    );
                    changes.created.push(index.clone());
                }
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
    }

    Outcome::Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldDescriptor;
    use crate::schema::ModelDef;
    use crate::schema::ModelSchema;

    #[test]
    fn test_primary_detection() {
        assert!(IndexSpec::ascending(ID_FIELD, true).is_primary());
        assert!(!IndexSpec::ascending("username", true).is_primary());
    }

    #[test]
    fn test_declared_indexes_from_field_hints() {
        let schema = ModelSchema::from_def(
            ModelDef::new("User")
                .field("username", FieldDescriptor::string().unique(true))
                .field("age", FieldDescriptor::integer().index(true))
                .field("bio", FieldDescriptor::string()),
        );
        let indexes = declared_indexes(&schema);
        assert_eq!(
            indexes,
            vec![
                IndexSpec::ascending("username", true),
                IndexSpec::ascending("age", false),
            ]
        );
    }

    #[test]
    fn test_declared_indexes_includes_composites() {
        let composite = IndexSpec::new(
            [("a", SortOrder::Ascending), ("b", SortOrder::Descending)],
            false,
        );
        let schema = ModelSchema::from_def(ModelDef::new("Pair").index(composite.clone()));
        assert_eq!(declared_indexes(&schema), vec![composite]);
    }
}
