//! The model registry: registration plus two-phase relation resolution.
//!
//! Registration order must never matter for relations, so resolution is a
//! separate pass: register every model first, then call
//! [`resolve_relations`](ModelRegistry::resolve_relations) once. Targets
//! declared by name stay [`RelationTarget::Pending`] until that pass, which
//! also installs the synthesized backward descriptors on the target schemas.

use std::collections::BTreeMap;

use crate::error::{Error, Result, SchemaErrorKind};
use crate::field::{FieldKind, RelationTarget};
use crate::schema::{BackwardDescriptor, BackwardKind, ModelDef, ModelSchema};

/// Registry of all model schemas, keyed by model name.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelSchema>,
    resolved: bool,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model definition.
    ///
    /// Abstract definitions are silently skipped: they exist only to be
    /// composed by application code and never dispatch to a store.
    /// Schema errors (duplicate model or collection name, reserved field
    /// names) are fatal and surface immediately.
    pub fn register(&mut self, def: ModelDef) -> Result<()> {
        if def.is_abstract {
            return Ok(());
        }

        def.check_field_names()?;

        if self.models.contains_key(&def.name) {
            return Err(Error::schema(
                SchemaErrorKind::DuplicateModel,
                format!("Model `{}` is already registered", def.name),
            ));
        }

        let schema = ModelSchema::from_def(def);

        if let Some(existing) = self
            .models
            .values()
            .find(|m| m.collection() == schema.collection())
        {
            return Err(Error::schema(
                SchemaErrorKind::DuplicateCollection,
                format!(
                    "The collection name `{}` already used by `{}` model. \
                     Please, specify collection_name manually.",
                    schema.collection(),
                    existing.name()
                ),
            ));
        }

        tracing::debug!(model = schema.name(), collection = schema.collection(), "Registered model");
        self.models.insert(schema.name().to_string(), schema);
        self.resolved = false;
        Ok(())
    }

    /// Resolve every pending relation target and install backward relations.
    ///
    /// Call once after all models are registered. Fails if any relation
    /// points at a model that never registered.
    pub fn resolve_relations(&mut self) -> Result<()> {
        // Phase one: flip Pending targets to Resolved, failing on unknowns.
        let model_names: Vec<String> = self.models.keys().cloned().collect();
        for name in &model_names {
            let schema = self
                .models
                .get_mut(name)
                .ok_or_else(|| Error::schema(SchemaErrorKind::UnknownModel, name.clone()))?;
            for (field_name, descriptor) in &mut schema.fields {
                if let FieldKind::Relation(rel) = &mut descriptor.kind {
                    let target = rel.target.name().to_string();
                    if !model_names.contains(&target) {
                        return Err(Error::schema(
                            SchemaErrorKind::UnknownRelationTarget,
                            format!(
                                "Relation field `{field_name}` of model `{name}` targets \
                                 unregistered model `{target}`"
                            ),
                        ));
                    }
                    rel.target = RelationTarget::Resolved(target);
                }
            }
        }

        // Phase two: install backward descriptors on the targets.
        let mut installs: Vec<(String, String, BackwardDescriptor)> = Vec::new();
        for (name, schema) in &self.models {
            for (field_name, descriptor) in &schema.fields {
                let FieldKind::Relation(rel) = &descriptor.kind else {
                    continue;
                };
                let related_name = rel
                    .related_name
                    .clone()
                    .unwrap_or_else(|| format!("{}_set", schema.collection()));
                installs.push((
                    rel.target.name().to_string(),
                    related_name,
                    BackwardDescriptor {
                        model: name.clone(),
                        field_name: field_name.clone(),
                        kind: BackwardKind::from(rel.kind),
                    },
                ));
            }
        }

        for (target, related_name, backward) in installs {
            let Some(schema) = self.models.get_mut(&target) else {
                continue;
            };
            if schema.field(&related_name).is_some()
                || schema.backward(&related_name).is_some()
            {
                return Err(Error::schema(
                    SchemaErrorKind::DuplicateRelatedName,
                    format!(
                        "Related name `{related_name}` already exists on model `{target}`"
                    ),
                ));
            }
            tracing::debug!(
                target = target.as_str(),
                related_name = related_name.as_str(),
                model = backward.model.as_str(),
                field = backward.field_name.as_str(),
                "Installed backward relation"
            );
            schema.backwards.push((related_name, backward));
            schema.has_backwards = true;
        }

        self.resolved = true;
        Ok(())
    }

    /// Whether [`resolve_relations`](Self::resolve_relations) has run since
    /// the last registration.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Look up a schema by model name.
    pub fn schema(&self, model: &str) -> Result<&ModelSchema> {
        self.models.get(model).ok_or_else(|| {
            Error::schema(
                SchemaErrorKind::UnknownModel,
                format!("Model `{model}` is not registered"),
            )
        })
    }

    #[must_use]
    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// Registered schemas, in name order.
    pub fn schemas(&self) -> impl Iterator<Item = &ModelSchema> {
        self.models.values()
    }
}
