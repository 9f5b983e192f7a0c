//! The ODM handle: explicitly-threaded registry plus database manager.
//!
//! There are no process-wide singletons. Applications build a resolved
//! [`ModelRegistry`] and a [`DatabaseManager`] at startup, wrap them in an
//! [`Odm`], and clone the (cheap, `Arc`-backed) handle wherever querysets and
//! instances are needed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use asupersync::{Cx, Outcome};
use docmodel_core::{
    DatabaseManager, Dispatcher, Error, IndexChanges, ModelRegistry, ModelSchema, Result,
};

use crate::instance::Instance;
use crate::queryset::QuerySet;

struct OdmInner {
    registry: ModelRegistry,
    databases: DatabaseManager,
    /// Dispatchers are resolved once per model and reused; the map is
    /// read-mostly after warmup.
    dispatchers: Mutex<BTreeMap<String, Arc<dyn Dispatcher>>>,
}

/// Cloneable handle over the registry and the store.
#[derive(Clone)]
pub struct Odm {
    inner: Arc<OdmInner>,
}

impl Odm {
    /// Build the handle. The registry must already have had its relations
    /// resolved.
    pub fn new(registry: ModelRegistry, databases: DatabaseManager) -> Result<Self> {
        if !registry.is_resolved() {
            return Err(Error::settings(
                "ModelRegistry::resolve_relations must run before building the Odm",
            ));
        }
        Ok(Self {
            inner: Arc::new(OdmInner {
                registry,
                databases,
                dispatchers: Mutex::new(BTreeMap::new()),
            }),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.inner.registry
    }

    /// Schema of a registered model.
    pub fn schema(&self, model: &str) -> Result<&ModelSchema> {
        self.inner.registry.schema(model)
    }

    /// A fresh queryset over all documents of `model`.
    pub fn objects(&self, model: &str) -> Result<QuerySet> {
        // Fail on unknown models immediately rather than at execution.
        self.schema(model)?;
        Ok(QuerySet::new(self.clone(), model))
    }

    /// A new, unsaved instance of `model`.
    pub fn new_instance(&self, model: &str) -> Result<Instance> {
        self.schema(model)?;
        Ok(Instance::new(self.clone(), model))
    }

    /// Collection-scoped dispatcher for a model, resolved through the
    /// model's database alias and cached.
    pub(crate) fn dispatcher(&self, model: &str) -> Result<Arc<dyn Dispatcher>> {
        if let Ok(dispatchers) = self.inner.dispatchers.lock() {
            if let Some(dispatcher) = dispatchers.get(model) {
                return Ok(Arc::clone(dispatcher));
            }
        }

        let schema = self.schema(model)?;
        let database = self.inner.databases.database(schema.db_alias())?;
        let dispatcher = database.dispatcher(schema.collection());

        if let Ok(mut dispatchers) = self.inner.dispatchers.lock() {
            dispatchers.insert(model.to_string(), Arc::clone(&dispatcher));
        }
        Ok(dispatcher)
    }

    /// Reconcile one model's declared indexes against the store.
    pub async fn sync_indexes(&self, cx: &Cx, model: &str) -> Outcome<IndexChanges, Error> {
        let (schema, dispatcher) = match (self.schema(model), self.dispatcher(model)) {
            (Ok(schema), Ok(dispatcher)) => (schema, dispatcher),
            (Err(e), _) | (_, Err(e)) => return Outcome::Err(e),
        };
        docmodel_core::index::reconcile(cx, schema, dispatcher.as_ref()).await
    }
}

impl std::fmt::Debug for Odm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Odm")
            .field(
                "models",
                &self
                    .inner
                    .registry
                    .schemas()
                    .map(ModelSchema::name)
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
