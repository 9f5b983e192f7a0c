//! Querysets: builder-pattern filter accumulation and lazy materialization.

use asupersync::{Cx, Outcome};
use docmodel_core::{
    BulkSummary, DeleteSummary, Document, DocumentCursor, Error, FindOptions, Result, SaveAction,
    SortKey, UpdateSummary, Value,
};
use docmodel_query::{QNode, compile, invert_node};

use crate::instance::Instance;
use crate::odm::Odm;

/// Projection operators accepted by [`QuerySet::fields`].
const PROJECTION_OPERATORS: &[&str] = &["slice"];

/// A lazily-executed query over one model's collection.
///
/// Filtering calls compile their expression immediately (surfacing unknown
/// fields and operators at call time) and deep-merge the result into the
/// accumulated filter. Execution creates a cursor once and memoizes it;
/// [`fetch`](QuerySet::fetch) drains and discards it, so a further-mutated
/// queryset re-materializes with fresh state.
pub struct QuerySet {
    odm: Odm,
    model: String,
    find: Document,
    sort: Vec<SortKey>,
    projection: Document,
    skip: Option<u64>,
    limit: Option<u64>,
    cursor: Option<Box<dyn DocumentCursor>>,
}

impl Clone for QuerySet {
    fn clone(&self) -> Self {
        Self {
            odm: self.odm.clone(),
            model: self.model.clone(),
            find: self.find.clone(),
            sort: self.sort.clone(),
            projection: self.projection.clone(),
            skip: self.skip,
            limit: self.limit,
            // A cursor is single-use state, never shared between querysets.
            cursor: None,
        }
    }
}

impl QuerySet {
    pub(crate) fn new(odm: Odm, model: &str) -> Self {
        Self {
            odm,
            model: model.to_string(),
            find: Document::new(),
            sort: Vec::new(),
            projection: Document::new(),
            skip: None,
            limit: None,
            cursor: None,
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The accumulated native filter.
    #[must_use]
    pub fn filter_document(&self) -> &Document {
        &self.find
    }

    fn compile_node(&self, node: &QNode) -> Result<Document> {
        let schema = self.odm.schema(&self.model)?;
        compile(node, schema)
    }

    /// Narrow the queryset to documents matching `node`.
    pub fn filter(mut self, node: impl Into<QNode>) -> Result<Self> {
        let compiled = self.compile_node(&node.into())?;
        self.find.merge(&compiled);
        Ok(self)
    }

    /// Narrow the queryset to documents *not* matching `node`.
    ///
    /// The argument is negated before compilation: a leaf becomes its `~Q`,
    /// a combination has each child negated recursively, and an
    /// already-negated node unwraps back to its positive form.
    pub fn exclude(mut self, node: impl Into<QNode>) -> Result<Self> {
        let inverted = invert_node(&node.into());
        let compiled = self.compile_node(&inverted)?;
        self.find.merge(&compiled);
        Ok(self)
    }

    /// Merge a raw native filter, bypassing compilation.
    #[must_use]
    pub fn raw_filter(mut self, filter: Document) -> Self {
        self.find.merge(&filter);
        self
    }

    /// Append sort keys (`"-field"` for descending). With no keys, the
    /// model's default sorting applies.
    #[must_use]
    pub fn sort(mut self, keys: &[&str]) -> Self {
        if keys.is_empty() {
            if let Ok(schema) = self.odm.schema(&self.model) {
                let defaults: Vec<SortKey> =
                    schema.sorting().iter().map(|k| SortKey::parse(k)).collect();
                self.sort.extend(defaults);
            }
            return self;
        }
        for key in keys {
            self.sort.push(SortKey::parse(key));
        }
        self
    }

    /// Skip the first `n` matching documents.
    #[must_use]
    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Yield at most `n` documents.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Slice analogue: `[skip..skip + limit]`.
    #[must_use]
    pub fn slice(self, skip: u64, limit: u64) -> Self {
        self.skip(skip).limit(limit)
    }

    /// Marker for "every document"; the empty filter already means that.
    #[must_use]
    pub fn all(self) -> Self {
        self
    }

    /// Field projection. Keys may carry a `__slice` suffix to project a
    /// bounded list prefix; dotted paths come from joining `__` segments.
    #[must_use]
    pub fn fields<'a>(mut self, pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        for (key, value) in pairs {
            let mut parts: Vec<&str> = key.split("__").collect();
            let has_operator = parts
                .last()
                .is_some_and(|last| PROJECTION_OPERATORS.contains(last));
            let value = if has_operator {
                let operator = parts.pop().unwrap_or_default();
                Value::Document(Document::from([(format!("${operator}").as_str(), value)]))
            } else {
                value
            };
            self.projection.insert(parts.join("."), value);
        }
        self
    }

    /// Project only the named fields.
    #[must_use]
    pub fn only(self, names: &[&str]) -> Self {
        self.fields(names.iter().map(|n| (*n, Value::Bool(true))))
    }

    /// Project everything but the named fields.
    #[must_use]
    pub fn defer(self, names: &[&str]) -> Self {
        self.fields(names.iter().map(|n| (*n, Value::Bool(false))))
    }

    /// Fetch exactly one document matching the accumulated filter plus
    /// `node`. Zero matches fail with `DoesNotExist`, several with
    /// `MultipleObjectsReturned`.
    #[tracing::instrument(level = "debug", skip(self, cx, node), fields(model = self.model.as_str()))]
    pub async fn get(mut self, cx: &Cx, node: impl Into<QNode>) -> Outcome<Instance, Error> {
        match self.compile_node(&node.into()) {
            Ok(compiled) => self.find.merge(&compiled),
            Err(e) => return Outcome::Err(e),
        }
        let dispatcher = match self.odm.dispatcher(&self.model) {
            Ok(dispatcher) => dispatcher,
            Err(e) => return Outcome::Err(e),
        };
        match dispatcher.get(cx, &self.projection, &self.find).await {
            Outcome::Ok(document) => {
                match Instance::from_document(self.odm.clone(), &self.model, document) {
                    Ok(instance) => Outcome::Ok(instance),
                    Err(e) => Outcome::Err(e),
                }
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Count documents matching the accumulated filter.
    pub async fn count(&self, cx: &Cx) -> Outcome<u64, Error> {
        let dispatcher = match self.odm.dispatcher(&self.model) {
            Ok(dispatcher) => dispatcher,
            Err(e) => return Outcome::Err(e),
        };
        dispatcher.count(cx, &self.find).await
    }

    /// Create and persist one instance from external field values.
    pub async fn create(&self, cx: &Cx, fields: Document) -> Outcome<Instance, Error> {
        let mut instance = match self.odm.new_instance(&self.model) {
            Ok(instance) => instance,
            Err(e) => return Outcome::Err(e),
        };
        for (key, value) in fields.iter() {
            instance.set(key.clone(), value.clone());
        }
        match instance.save(cx).await {
            Outcome::Ok(()) => Outcome::Ok(instance),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Apply a partial update to every matching document.
    pub async fn update(&self, cx: &Cx, fields: Document) -> Outcome<UpdateSummary, Error> {
        let dispatcher = match self.odm.dispatcher(&self.model) {
            Ok(dispatcher) => dispatcher,
            Err(e) => return Outcome::Err(e),
        };
        dispatcher.update_many(cx, &self.find, &fields).await
    }

    /// Delete every matching document.
    ///
    /// Models without inbound relations delete in one bulk operation. Models
    /// with backward relations fall back to per-instance deletion so the
    /// cascade engine sees each document's identity; cascades cannot be
    /// expressed as a single bulk operation.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.model.as_str()))]
    pub async fn delete(&mut self, cx: &Cx) -> Outcome<DeleteSummary, Error> {
        let has_backwards = match self.odm.schema(&self.model) {
            Ok(schema) => schema.has_backwards(),
            Err(e) => return Outcome::Err(e),
        };

        if !has_backwards {
            let dispatcher = match self.odm.dispatcher(&self.model) {
                Ok(dispatcher) => dispatcher,
                Err(e) => return Outcome::Err(e),
            };
            return dispatcher.delete_many(cx, &self.find).await;
        }

        let instances = match self.fetch(cx).await {
            Outcome::Ok(instances) => instances,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut deleted = 0;
        for mut instance in instances {
            match instance.delete(cx).await {
                Outcome::Ok(()) => deleted += 1,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
        Outcome::Ok(DeleteSummary { deleted })
    }

    /// Run every instance through the normal internal-value pipeline, then
    /// insert the whole batch as a single multi-insert operation.
    pub async fn bulk_create(
        &self,
        cx: &Cx,
        instances: &[Instance],
    ) -> Outcome<BulkSummary, Error> {
        let mut documents = Vec::with_capacity(instances.len());
        for instance in instances {
            match instance.internal_values(cx, SaveAction::Create).await {
                Outcome::Ok(document) => documents.push(document),
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
        let dispatcher = match self.odm.dispatcher(&self.model) {
            Ok(dispatcher) => dispatcher,
            Err(e) => return Outcome::Err(e),
        };
        dispatcher.bulk_create(cx, &documents).await
    }

    async fn ensure_cursor(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if self.cursor.is_some() {
            return Outcome::Ok(());
        }
        let dispatcher = match self.odm.dispatcher(&self.model) {
            Ok(dispatcher) => dispatcher,
            Err(e) => return Outcome::Err(e),
        };
        let options = FindOptions {
            sort: self.sort.clone(),
            limit: self.limit,
            skip: self.skip,
            projection: self.projection.clone(),
        };
        match dispatcher.find(cx, &self.find, options).await {
            Outcome::Ok(cursor) => {
                self.cursor = Some(cursor);
                Outcome::Ok(())
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Drain the (memoized) cursor into a list of instances, then discard it
    /// so the queryset can be re-executed after further mutation.
    #[tracing::instrument(level = "trace", skip(self, cx), fields(model = self.model.as_str()))]
    pub async fn fetch(&mut self, cx: &Cx) -> Outcome<Vec<Instance>, Error> {
        match self.ensure_cursor(cx).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        let mut instances = Vec::new();
        while let Some(cursor) = self.cursor.as_mut() {
            match cursor.next(cx).await {
                Outcome::Ok(Some(document)) => {
                    match Instance::from_document(self.odm.clone(), &self.model, document) {
                        Ok(instance) => instances.push(instance),
                        Err(e) => return Outcome::Err(e),
                    }
                }
                Outcome::Ok(None) => break,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        self.cursor = None;
        Outcome::Ok(instances)
    }

    /// Yield the next matching instance, or `None` when exhausted.
    pub async fn next(&mut self, cx: &Cx) -> Outcome<Option<Instance>, Error> {
        match self.ensure_cursor(cx).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        let Some(cursor) = self.cursor.as_mut() else {
            return Outcome::Ok(None);
        };
        match cursor.next(cx).await {
            Outcome::Ok(Some(document)) => {
                match Instance::from_document(self.odm.clone(), &self.model, document) {
                    Ok(instance) => Outcome::Ok(Some(instance)),
                    Err(e) => Outcome::Err(e),
                }
            }
            Outcome::Ok(None) => {
                self.cursor = None;
                Outcome::Ok(None)
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

impl std::fmt::Debug for QuerySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySet")
            .field("model", &self.model)
            .field("find", &self.find)
            .field("sort", &self.sort)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .finish()
    }
}
