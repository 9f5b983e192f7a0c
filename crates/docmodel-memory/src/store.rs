//! The in-memory store: client, database, and collection dispatchers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use asupersync::{Cx, Outcome};
use docmodel_core::{
    BoxFuture, BulkSummary, Client, ClientFactory, ConnectionSettings, Database, DeleteSummary,
    Dispatcher, Document, DocumentCursor, Error, FindOptions, ID_FIELD, IndexSpec, Result,
    SortOrder, StoreErrorKind, UpdateSummary, Value,
};

use crate::filter::{matches, order_values};

/// Shared log of mutating store operations, in execution order.
///
/// Entries are `"{operation} {collection}"`. Tests use the log to assert
/// ordering properties (cascades executing leaf-first, bulk vs per-document
/// deletes) that results alone cannot show.
#[derive(Clone, Default)]
pub struct OpLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl OpLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, operation: &str, collection: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(format!("{operation} {collection}"));
        }
    }

    /// Snapshot of all recorded entries.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

struct CollectionState {
    docs: Vec<Document>,
    next_id: i64,
    indexes: Vec<IndexSpec>,
}

/// One collection's documents plus its dispatcher implementation.
pub struct MemoryCollection {
    name: String,
    state: Mutex<CollectionState>,
    log: OpLog,
}

impl MemoryCollection {
    fn new(name: &str, log: OpLog) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(CollectionState {
                docs: Vec::new(),
                next_id: 1,
                indexes: Vec::new(),
            }),
            log,
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut CollectionState) -> T) -> Result<T> {
        self.state
            .lock()
            .map(|mut state| f(&mut state))
            .map_err(|_| Error::store(StoreErrorKind::Other, "collection state poisoned"))
    }

    fn check_unique(state: &CollectionState, candidate: &Document) -> Result<()> {
        for index in state.indexes.iter().filter(|i| i.unique && !i.is_primary()) {
            let key: Vec<Option<&Value>> = index
                .keys
                .iter()
                .map(|(field, _)| candidate.get_path(field))
                .collect();
            if key.iter().all(Option::is_none) {
                continue;
            }
            for existing in &state.docs {
                let existing_key: Vec<Option<&Value>> = index
                    .keys
                    .iter()
                    .map(|(field, _)| existing.get_path(field))
                    .collect();
                if key == existing_key {
                    return Err(Error::store(
                        StoreErrorKind::DuplicateKey,
                        format!(
                            "duplicate key for index {:?}",
                            index.keys.iter().map(|(f, _)| f).collect::<Vec<_>>()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn insert_document(state: &mut CollectionState, fields: &Document) -> Result<Document> {
        let mut document = fields.clone();
        if document.get(ID_FIELD).is_none() {
            document.insert(ID_FIELD, Value::Int(state.next_id));
            state.next_id += 1;
        }
        Self::check_unique(state, &document)?;
        state.docs.push(document.clone());
        Ok(document)
    }

    fn apply_fields(target: &mut Document, fields: &Document) {
        for (key, value) in fields.iter() {
            target.insert(key.clone(), value.clone());
        }
    }

    fn sorted(mut docs: Vec<Document>, options: &FindOptions) -> Vec<Document> {
        if !options.sort.is_empty() {
            docs.sort_by(|a, b| {
                for key in &options.sort {
                    let ordering = order_values(a.get_path(&key.field), b.get_path(&key.field));
                    let ordering = match key.order {
                        SortOrder::Ascending => ordering,
                        SortOrder::Descending => ordering.reverse(),
                    };
                    if ordering != std::cmp::Ordering::Equal {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let mut docs: Vec<Document> = docs.into_iter().skip(skip).collect();
        if let Some(limit) = options.limit {
            docs.truncate(limit as usize);
        }
        docs
    }

    fn project(document: &Document, projection: &Document) -> Document {
        if projection.is_empty() {
            return document.clone();
        }

        let mut result = document.clone();

        // $slice projections truncate list fields without affecting the
        // include/exclude decision.
        let mut includes: Vec<&str> = Vec::new();
        let mut excludes: Vec<&str> = Vec::new();
        for (key, value) in projection.iter() {
            match value {
                Value::Bool(true) => includes.push(key.as_str()),
                Value::Bool(false) => excludes.push(key.as_str()),
                Value::Document(ops) => {
                    if let Some(n) = ops.get("$slice").and_then(Value::as_i64) {
                        if let Some(Value::List(items)) = result.get(key).cloned() {
                            let truncated: Vec<Value> =
                                items.into_iter().take(n.max(0) as usize).collect();
                            result.insert(key.clone(), Value::List(truncated));
                        }
                    }
                }
                _ => {}
            }
        }

        if !includes.is_empty() {
            let keep: Vec<String> = result
                .keys()
                .filter(|k| includes.contains(&k.as_str()) || k.as_str() == ID_FIELD)
                .cloned()
                .collect();
            let mut kept = Document::new();
            for key in keep {
                if let Some(value) = result.get(&key) {
                    kept.insert(key.clone(), value.clone());
                }
            }
            result = kept;
        }
        for key in excludes {
            result.remove(key);
        }

        result
    }
}

struct MemoryCursor {
    docs: VecDeque<Document>,
}

impl DocumentCursor for MemoryCursor {
    fn next<'a>(&'a mut self, _cx: &'a Cx) -> BoxFuture<'a, Outcome<Option<Document>, Error>> {
        Box::pin(async move { Outcome::Ok(self.docs.pop_front()) })
    }
}

impl Dispatcher for MemoryCollection {
    fn collection_name(&self) -> &str {
        &self.name
    }

    fn count<'a>(
        &'a self,
        _cx: &'a Cx,
        filter: &'a Document,
    ) -> BoxFuture<'a, Outcome<u64, Error>> {
        Box::pin(async move {
            match self.with_state(|state| {
                state.docs.iter().filter(|doc| matches(filter, doc)).count() as u64
            }) {
                Ok(count) => Outcome::Ok(count),
                Err(e) => Outcome::Err(e),
            }
        })
    }

    fn create<'a>(
        &'a self,
        _cx: &'a Cx,
        fields: &'a Document,
    ) -> BoxFuture<'a, Outcome<Document, Error>> {
        Box::pin(async move {
            self.log.record("create", &self.name);
            match self.with_state(|state| Self::insert_document(state, fields)) {
                Ok(Ok(document)) => Outcome::Ok(document),
                Ok(Err(e)) | Err(e) => Outcome::Err(e),
            }
        })
    }

    fn update_one<'a>(
        &'a self,
        _cx: &'a Cx,
        id: &'a Value,
        fields: &'a Document,
    ) -> BoxFuture<'a, Outcome<Document, Error>> {
        Box::pin(async move {
            self.log.record("update_one", &self.name);
            let result = self.with_state(|state| {
                for doc in &mut state.docs {
                    if doc.get(ID_FIELD) == Some(id) {
                        Self::apply_fields(doc, fields);
                        return Some(doc.clone());
                    }
                }
                None
            });
            match result {
                Ok(Some(document)) => Outcome::Ok(document),
                Ok(None) => Outcome::Err(Error::DoesNotExist(self.name.clone())),
                Err(e) => Outcome::Err(e),
            }
        })
    }

    fn update_many<'a>(
        &'a self,
        _cx: &'a Cx,
        filter: &'a Document,
        fields: &'a Document,
    ) -> BoxFuture<'a, Outcome<UpdateSummary, Error>> {
        Box::pin(async move {
            self.log.record("update_many", &self.name);
            let result = self.with_state(|state| {
                let mut summary = UpdateSummary::default();
                for doc in &mut state.docs {
                    if matches(filter, doc) {
                        summary.matched += 1;
                        Self::apply_fields(doc, fields);
                        summary.modified += 1;
                    }
                }
                summary
            });
            match result {
                Ok(summary) => Outcome::Ok(summary),
                Err(e) => Outcome::Err(e),
            }
        })
    }

    fn get<'a>(
        &'a self,
        _cx: &'a Cx,
        projection: &'a Document,
        filter: &'a Document,
    ) -> BoxFuture<'a, Outcome<Document, Error>> {
        Box::pin(async move {
            let result = self.with_state(|state| {
                let matched: Vec<Document> = state
                    .docs
                    .iter()
                    .filter(|doc| matches(filter, doc))
                    .cloned()
                    .collect();
                matched
            });
            let matched = match result {
                Ok(matched) => matched,
                Err(e) => return Outcome::Err(e),
            };
            match matched.len() {
                0 => Outcome::Err(Error::DoesNotExist(self.name.clone())),
                1 => Outcome::Ok(Self::project(&matched[0], projection)),
                _ => Outcome::Err(Error::MultipleObjectsReturned(self.name.clone())),
            }
        })
    }

    fn find<'a>(
        &'a self,
        _cx: &'a Cx,
        filter: &'a Document,
        options: FindOptions,
    ) -> BoxFuture<'a, Outcome<Box<dyn DocumentCursor>, Error>> {
        Box::pin(async move {
            let result = self.with_state(|state| {
                state
                    .docs
                    .iter()
                    .filter(|doc| matches(filter, doc))
                    .cloned()
                    .collect::<Vec<Document>>()
            });
            match result {
                Ok(docs) => {
                    let docs = Self::sorted(docs, &options);
                    let docs: VecDeque<Document> = docs
                        .iter()
                        .map(|doc| Self::project(doc, &options.projection))
                        .collect();
                    Outcome::Ok(Box::new(MemoryCursor { docs }) as Box<dyn DocumentCursor>)
                }
                Err(e) => Outcome::Err(e),
            }
        })
    }

    fn delete_one<'a>(
        &'a self,
        _cx: &'a Cx,
        filter: &'a Document,
    ) -> BoxFuture<'a, Outcome<DeleteSummary, Error>> {
        Box::pin(async move {
            self.log.record("delete_one", &self.name);
            let result = self.with_state(|state| {
                if let Some(position) = state.docs.iter().position(|doc| matches(filter, doc)) {
                    state.docs.remove(position);
                    DeleteSummary { deleted: 1 }
                } else {
                    DeleteSummary { deleted: 0 }
                }
            });
            match result {
                Ok(summary) => Outcome::Ok(summary),
                Err(e) => Outcome::Err(e),
            }
        })
    }

    fn delete_many<'a>(
        &'a self,
        _cx: &'a Cx,
        filter: &'a Document,
    ) -> BoxFuture<'a, Outcome<DeleteSummary, Error>> {
        Box::pin(async move {
            self.log.record("delete_many", &self.name);
            let result = self.with_state(|state| {
                let before = state.docs.len();
                state.docs.retain(|doc| !matches(filter, doc));
                DeleteSummary {
                    deleted: (before - state.docs.len()) as u64,
                }
            });
            match result {
                Ok(summary) => Outcome::Ok(summary),
                Err(e) => Outcome::Err(e),
            }
        })
    }

    fn bulk_create<'a>(
        &'a self,
        _cx: &'a Cx,
        documents: &'a [Document],
    ) -> BoxFuture<'a, Outcome<BulkSummary, Error>> {
        Box::pin(async move {
            self.log.record("bulk_create", &self.name);
            let result = self.with_state(|state| {
                let mut inserted = 0;
                for fields in documents {
                    Self::insert_document(state, fields)?;
                    inserted += 1;
                }
                Ok(BulkSummary { inserted })
            });
            match result {
                Ok(Ok(summary)) => Outcome::Ok(summary),
                Ok(Err(e)) | Err(e) => Outcome::Err(e),
            }
        })
    }

    fn list_indexes<'a>(&'a self, _cx: &'a Cx) -> BoxFuture<'a, Outcome<Vec<IndexSpec>, Error>> {
        Box::pin(async move {
            let result = self.with_state(|state| {
                let mut indexes = vec![IndexSpec::ascending(ID_FIELD, true)];
                indexes.extend(state.indexes.iter().cloned());
                indexes
            });
            match result {
                Ok(indexes) => Outcome::Ok(indexes),
                Err(e) => Outcome::Err(e),
            }
        })
    }

    fn create_index<'a>(
        &'a self,
        _cx: &'a Cx,
        index: &'a IndexSpec,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let result = self.with_state(|state| {
                if !state.indexes.contains(index) {
                    state.indexes.push(index.clone());
                }
            });
            match result {
                Ok(()) => Outcome::Ok(()),
                Err(e) => Outcome::Err(e),
            }
        })
    }

    fn drop_index<'a>(
        &'a self,
        _cx: &'a Cx,
        index: &'a IndexSpec,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let result = self.with_state(|state| {
                state.indexes.retain(|existing| existing != index);
            });
            match result {
                Ok(()) => Outcome::Ok(()),
                Err(e) => Outcome::Err(e),
            }
        })
    }
}

/// An in-memory database: a set of named collections sharing one op log.
pub struct MemoryDatabase {
    name: String,
    collections: Mutex<Vec<Arc<MemoryCollection>>>,
    log: OpLog,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new(name: &str, log: OpLog) -> Self {
        Self {
            name: name.to_string(),
            collections: Mutex::new(Vec::new()),
            log,
        }
    }
}

impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn dispatcher(&self, collection: &str) -> Arc<dyn Dispatcher> {
        let mut collections = match self.collections.lock() {
            Ok(collections) => collections,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = collections.iter().find(|c| c.name == collection) {
            return Arc::clone(existing) as Arc<dyn Dispatcher>;
        }
        let created = Arc::new(MemoryCollection::new(collection, self.log.clone()));
        collections.push(Arc::clone(&created));
        created
    }
}

/// An in-memory client: databases keyed by name, created on demand.
pub struct MemoryClient {
    databases: Mutex<Vec<Arc<MemoryDatabase>>>,
    log: OpLog,
}

impl MemoryClient {
    #[must_use]
    pub fn new(log: OpLog) -> Self {
        Self {
            databases: Mutex::new(Vec::new()),
            log,
        }
    }
}

impl Client for MemoryClient {
    fn database(
        &self,
        name: &str,
        _credentials: Option<(&str, &str)>,
    ) -> Result<Arc<dyn Database>> {
        let mut databases = match self.databases.lock() {
            Ok(databases) => databases,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = databases.iter().find(|db| db.name == name) {
            return Ok(Arc::clone(existing) as Arc<dyn Database>);
        }
        let created = Arc::new(MemoryDatabase::new(name, self.log.clone()));
        databases.push(Arc::clone(&created));
        Ok(created)
    }
}

/// Connects in-memory clients. All clients share the factory's op log so
/// tests can observe cross-collection operation ordering.
#[derive(Default)]
pub struct MemoryClientFactory {
    log: OpLog,
}

impl MemoryClientFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an externally-owned op log.
    #[must_use]
    pub fn with_log(log: OpLog) -> Self {
        Self { log }
    }

    #[must_use]
    pub fn log(&self) -> OpLog {
        self.log.clone()
    }
}

impl ClientFactory for MemoryClientFactory {
    fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Client>> {
        tracing::debug!(host = settings.host.as_str(), port = settings.port, "Memory client connected");
        Ok(Arc::new(MemoryClient::new(self.log.clone())))
    }
}
