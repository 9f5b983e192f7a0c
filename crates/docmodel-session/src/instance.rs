//! Live document instances and their persistence lifecycle.
//!
//! An [`Instance`] is an explicit document-state struct: field access goes
//! through [`get`](Instance::get)/[`set`](Instance::set), and every external
//! write records the field in a modified set so updates only ever send
//! changed fields. No attribute interception, no hidden magic.

use std::collections::BTreeSet;

use asupersync::{Cx, Outcome};
use docmodel_core::{
    Document, Error, ID_FIELD, Result, SaveAction, Value, check_type, resolve_value, validate,
};

use crate::odm::Odm;
use crate::on_delete;
use crate::queryset::QuerySet;
use docmodel_query::Q;

/// A live document bound to a registered model.
///
/// Lifecycle: `{unsaved, no identifier}` → [`save`](Instance::save) →
/// `{persisted}` → [`delete`](Instance::delete) → `{unsaved, identifier
/// cleared}`. A persisted instance can be saved again at any time; its state
/// is re-synced from the store's post-write document.
#[derive(Clone)]
pub struct Instance {
    odm: Odm,
    model: String,
    document: Document,
    modified: BTreeSet<String>,
}

impl Instance {
    pub(crate) fn new(odm: Odm, model: &str) -> Self {
        Self {
            odm,
            model: model.to_string(),
            document: Document::new(),
            modified: BTreeSet::new(),
        }
    }

    /// Materialize an instance from a raw stored document, converting every
    /// declared field to its external form. Undeclared fields pass through
    /// untouched.
    pub(crate) fn from_document(odm: Odm, model: &str, raw: Document) -> Result<Self> {
        let mut document = Document::new();
        {
            let schema = odm.schema(model)?;
            for (key, value) in raw.iter() {
                let value = match schema.field(key) {
                    Some(field) => field.to_external_value(value.clone()),
                    None => value.clone(),
                };
                document.insert(key.clone(), value);
            }
        }
        Ok(Self {
            odm,
            model: model.to_string(),
            document,
            modified: BTreeSet::new(),
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The store-assigned identifier, absent until first creation.
    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.document.get(ID_FIELD).filter(|v| !v.is_null())
    }

    /// Read a field's external value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.document.get(name)
    }

    /// Write a field value, recording it as modified. Declared or not, the
    /// value is kept; undeclared fields are passed to the store unvalidated.
    /// Names starting with `_` are internal and not dirty-tracked.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        if !name.starts_with('_') {
            self.modified.insert(name.clone());
        }
        self.document.insert(name, value.into());
        self
    }

    /// Field names modified since the last save.
    #[must_use]
    pub fn modified_fields(&self) -> &BTreeSet<String> {
        &self.modified
    }

    /// Fields present on this document but not declared in the schema.
    #[must_use]
    pub fn undeclared_fields(&self) -> Vec<&str> {
        let Ok(schema) = self.odm.schema(&self.model) else {
            return Vec::new();
        };
        self.document
            .keys()
            .filter(|key| !key.starts_with('_') && schema.field(key).is_none())
            .map(String::as_str)
            .collect()
    }

    /// Display label of a choices-configured field's stored value.
    pub fn display(&self, name: &str) -> Result<String> {
        let schema = self.odm.schema(&self.model)?;
        let field = schema
            .field(name)
            .ok_or_else(|| Error::queryset(format!("Field `{name}` is not declared")))?;
        let choices = field
            .choices
            .as_ref()
            .ok_or_else(|| Error::queryset(format!("Field `{name}` has no 'choices' attribute")))?;
        let stored = self.document.get(name).unwrap_or(&Value::Null);
        Ok(choices.label(stored)?.to_string())
    }

    /// Fetch the document a relation field points at.
    ///
    /// Every call builds a fresh query; relation reads are factories, never
    /// cached awaitables.
    pub async fn related(&self, cx: &Cx, name: &str) -> Outcome<Option<Instance>, Error> {
        let target = {
            let schema = match self.odm.schema(&self.model) {
                Ok(schema) => schema,
                Err(e) => return Outcome::Err(e),
            };
            let Some(field) = schema.field(name) else {
                return Outcome::Err(Error::queryset(format!("Field `{name}` is not declared")));
            };
            let Some(rel) = field.relation() else {
                return Outcome::Err(Error::queryset(format!(
                    "Field `{name}` is not a relation field"
                )));
            };
            rel.target.name().to_string()
        };

        let id = match self.document.get(name) {
            Some(value) if !value.is_null() => value.reference_id().clone(),
            _ => return Outcome::Ok(None),
        };

        let queryset = match self.odm.objects(&target) {
            Ok(queryset) => queryset,
            Err(e) => return Outcome::Err(e),
        };
        match queryset.get(cx, Q::with(ID_FIELD, id)).await {
            Outcome::Ok(instance) => Outcome::Ok(Some(instance)),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// A fresh queryset over the documents referencing this instance through
    /// the named backward relation.
    pub fn backward(&self, related_name: &str) -> Result<QuerySet> {
        let Some(id) = self.id().cloned() else {
            return Err(Error::queryset(
                "An unsaved instance has no backward relations",
            ));
        };
        let (model, field_name) = {
            let schema = self.odm.schema(&self.model)?;
            let backward = schema.backward(related_name).ok_or_else(|| {
                Error::queryset(format!("Backward relation `{related_name}` is not installed"))
            })?;
            (backward.model.clone(), backward.field_name.clone())
        };
        self.odm.objects(&model)?.filter(Q::with(field_name, id))
    }

    /// Persist this instance: create when it has no identifier, partial
    /// update of the modified fields otherwise. The store's post-write
    /// document is folded back into instance state.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.model.as_str()))]
    pub async fn save(&mut self, cx: &Cx) -> Outcome<(), Error> {
        let document = if self.id().is_some() {
            self.update_path(cx).await
        } else {
            self.create_path(cx).await
        };

        let document = match document {
            Outcome::Ok(document) => document,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let external = match self.to_external(document) {
            Ok(external) => external,
            Err(e) => return Outcome::Err(e),
        };
        self.document.merge(&external);
        self.modified.clear();
        Outcome::Ok(())
    }

    async fn create_path(&self, cx: &Cx) -> Outcome<Document, Error> {
        let internal = match self.internal_values(cx, SaveAction::Create).await {
            Outcome::Ok(internal) => internal,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let dispatcher = match self.odm.dispatcher(&self.model) {
            Ok(dispatcher) => dispatcher,
            Err(e) => return Outcome::Err(e),
        };
        dispatcher.create(cx, &internal).await
    }

    async fn update_path(&self, cx: &Cx) -> Outcome<Document, Error> {
        let internal = match self.internal_values(cx, SaveAction::Update).await {
            Outcome::Ok(internal) => internal,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let dispatcher = match self.odm.dispatcher(&self.model) {
            Ok(dispatcher) => dispatcher,
            Err(e) => return Outcome::Err(e),
        };
        let id = match self.id() {
            Some(id) => id.clone(),
            None => return Outcome::Err(Error::queryset("Cannot update an unsaved instance")),
        };
        dispatcher.update_one(cx, &id, &internal).await
    }

    /// Delete this document. Models with inbound relations run the cascade
    /// engine first; the identifier is cleared on success.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.model.as_str()))]
    pub async fn delete(&mut self, cx: &Cx) -> Outcome<(), Error> {
        let id = match self.id() {
            Some(id) => id.clone(),
            None => return Outcome::Err(Error::queryset("Cannot delete an unsaved instance")),
        };

        let has_backwards = match self.odm.schema(&self.model) {
            Ok(schema) => schema.has_backwards(),
            Err(e) => return Outcome::Err(e),
        };
        if has_backwards {
            match on_delete::handle_backwards(cx, &self.odm, std::slice::from_ref(self)).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        let dispatcher = match self.odm.dispatcher(&self.model) {
            Ok(dispatcher) => dispatcher,
            Err(e) => return Outcome::Err(e),
        };
        let filter = Document::from([(ID_FIELD, id)]);
        match dispatcher.delete_one(cx, &filter).await {
            Outcome::Ok(_) => {
                self.document.remove(ID_FIELD);
                Outcome::Ok(())
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Run the full field pipeline and produce the store-bound document.
    ///
    /// On the update path only modified fields are prepared; untouched
    /// fields are never re-sent. Undeclared fields are merged in verbatim,
    /// unvalidated, on both paths.
    pub(crate) async fn internal_values(
        &self,
        cx: &Cx,
        action: SaveAction,
    ) -> Outcome<Document, Error> {
        let field_names: Vec<String> = match self.odm.schema(&self.model) {
            Ok(schema) => schema.fields().map(|(n, _)| n.to_string()).collect(),
            Err(e) => return Outcome::Err(e),
        };

        let mut internal = Document::new();

        for name in &field_names {
            if action == SaveAction::Update && !self.modified.contains(name) {
                continue;
            }

            let prepared = self.prepare_field(cx, name, action).await;
            match prepared {
                Outcome::Ok(value) => {
                    internal.insert(name.clone(), value);
                }
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        for key in self.undeclared_fields() {
            if let Some(value) = self.document.get(key) {
                internal.insert(key.to_string(), value.clone());
            }
        }

        Outcome::Ok(internal)
    }

    async fn prepare_field(
        &self,
        cx: &Cx,
        name: &str,
        action: SaveAction,
    ) -> Outcome<Value, Error> {
        let (field, target) = {
            let schema = match self.odm.schema(&self.model) {
                Ok(schema) => schema,
                Err(e) => return Outcome::Err(e),
            };
            let Some(field) = schema.field(name) else {
                return Outcome::Err(Error::queryset(format!("Field `{name}` is not declared")));
            };
            let target = field.relation().map(|rel| rel.target.name().to_string());
            (field.clone(), target)
        };

        let raw = self.document.get(name).cloned();
        let value = match resolve_value(&field, raw, action).await {
            Ok(value) => value,
            Err(e) => return Outcome::Err(e),
        };
        if let Err(e) = validate(&field, name, &value) {
            return Outcome::Err(e);
        }

        // Referenced documents must exist before anything is written.
        if let Some(target) = &target {
            if !value.is_null() {
                match self.check_relation_exists(cx, name, target, &value).await {
                    Outcome::Ok(()) => {}
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            }
        }

        let value = match self.apply_custom_validator(name, &field, value) {
            Ok(value) => value,
            Err(e) => return Outcome::Err(e),
        };

        let collection = match &target {
            Some(target) => match self.odm.schema(target) {
                Ok(schema) => schema.collection().to_string(),
                Err(e) => return Outcome::Err(e),
            },
            None => String::new(),
        };

        Outcome::Ok(field.to_internal_value(value, &collection))
    }

    async fn check_relation_exists(
        &self,
        cx: &Cx,
        name: &str,
        target: &str,
        value: &Value,
    ) -> Outcome<(), Error> {
        let dispatcher = match self.odm.dispatcher(target) {
            Ok(dispatcher) => dispatcher,
            Err(e) => return Outcome::Err(e),
        };
        let id = value.reference_id().clone();
        let filter = Document::from([(ID_FIELD, id.clone())]);
        match dispatcher.count(cx, &filter).await {
            Outcome::Ok(0) => Outcome::Err(Error::validation(
                format!(
                    "Relation document with id {id:?} does not exist. \
                     Model: `{}`, Field: `{name}`",
                    self.model
                ),
                false,
            )),
            Outcome::Ok(_) => Outcome::Ok(()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    fn apply_custom_validator(
        &self,
        name: &str,
        field: &docmodel_core::FieldDescriptor,
        value: Value,
    ) -> Result<Value> {
        let schema = self.odm.schema(&self.model)?;
        let Some(validator) = schema.validator(name) else {
            return Ok(value);
        };
        match validator(&value)? {
            Some(replacement) => {
                // A replacement of the wrong semantic type is a programmer
                // error in the validator, not bad input.
                check_type(field, name, &replacement, false).map_err(|_| {
                    Error::validation(
                        format!(
                            "Custom validator for field `{name}` returned \
                             '{}', but '{}' expected",
                            replacement.type_name(),
                            field.kind.name()
                        ),
                        false,
                    )
                })?;
                Ok(replacement)
            }
            None => Ok(value),
        }
    }

    fn to_external(&self, document: Document) -> Result<Document> {
        let schema = self.odm.schema(&self.model)?;
        let mut external = Document::new();
        for (key, value) in document.iter() {
            let value = match schema.field(key) {
                Some(field) => field.to_external_value(value.clone()),
                None => value.clone(),
            };
            external.insert(key.clone(), value);
        }
        Ok(external)
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("model", &self.model)
            .field("id", &self.document.get(ID_FIELD))
            .field("modified", &self.modified)
            .finish()
    }
}
