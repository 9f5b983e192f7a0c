//! The dispatcher contract: the sole boundary to the document store.
//!
//! Drivers implement [`Dispatcher`] per collection. The trait is object-safe
//! (boxed futures) so the runtime layer can hold heterogeneous dispatchers
//! behind `Arc<dyn Dispatcher>`; this mirrors how transaction internals are
//! type-erased elsewhere in the stack.

use std::future::Future;
use std::pin::Pin;

use asupersync::{Cx, Outcome};

use crate::document::Document;
use crate::error::Error;
use crate::index::IndexSpec;

/// Boxed future alias used by object-safe store traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Sort direction for find operations and index keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One sort key of a find operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

impl SortKey {
    /// Parse a sort key string: a `-` prefix means descending.
    #[must_use]
    pub fn parse(key: &str) -> Self {
        key.strip_prefix('-').map_or_else(
            || Self {
                field: key.to_string(),
                order: SortOrder::Ascending,
            },
            |field| Self {
                field: field.to_string(),
                order: SortOrder::Descending,
            },
        )
    }
}

/// Options accompanying a find round-trip.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub projection: Document,
}

/// Summary of an update_many round-trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub matched: u64,
    pub modified: u64,
}

/// Summary of a delete round-trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub deleted: u64,
}

/// Summary of a bulk insert round-trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub inserted: u64,
}

/// A lazy cursor over found documents. Each advance is an independently
/// awaitable unit of work.
pub trait DocumentCursor: Send + Sync {
    /// Fetch the next document, or `None` when the cursor is exhausted.
    fn next<'a>(&'a mut self, cx: &'a Cx) -> BoxFuture<'a, Outcome<Option<Document>, Error>>;
}

/// Store operations scoped to one collection.
///
/// Implementations must not wrap store-native failures: duplicate-key errors
/// in particular propagate to callers unmodified.
pub trait Dispatcher: Send + Sync {
    /// Collection this dispatcher operates on.
    fn collection_name(&self) -> &str;

    /// Count documents matching `filter`.
    fn count<'a>(&'a self, cx: &'a Cx, filter: &'a Document)
        -> BoxFuture<'a, Outcome<u64, Error>>;

    /// Insert one document; returns the stored document including the
    /// store-assigned identifier and any store-side defaults.
    fn create<'a>(
        &'a self,
        cx: &'a Cx,
        fields: &'a Document,
    ) -> BoxFuture<'a, Outcome<Document, Error>>;

    /// Apply a partial update to the document with identifier `id`; returns
    /// the post-update document.
    fn update_one<'a>(
        &'a self,
        cx: &'a Cx,
        id: &'a crate::value::Value,
        fields: &'a Document,
    ) -> BoxFuture<'a, Outcome<Document, Error>>;

    /// Apply a partial update to every document matching `filter`.
    fn update_many<'a>(
        &'a self,
        cx: &'a Cx,
        filter: &'a Document,
        fields: &'a Document,
    ) -> BoxFuture<'a, Outcome<UpdateSummary, Error>>;

    /// Fetch exactly one document matching `filter`.
    ///
    /// Fails with [`Error::DoesNotExist`] on zero matches and
    /// [`Error::MultipleObjectsReturned`] on more than one.
    fn get<'a>(
        &'a self,
        cx: &'a Cx,
        projection: &'a Document,
        filter: &'a Document,
    ) -> BoxFuture<'a, Outcome<Document, Error>>;

    /// Open a lazy cursor over documents matching `filter`.
    fn find<'a>(
        &'a self,
        cx: &'a Cx,
        filter: &'a Document,
        options: FindOptions,
    ) -> BoxFuture<'a, Outcome<Box<dyn DocumentCursor>, Error>>;

    /// Delete the first document matching `filter`.
    fn delete_one<'a>(
        &'a self,
        cx: &'a Cx,
        filter: &'a Document,
    ) -> BoxFuture<'a, Outcome<DeleteSummary, Error>>;

    /// Delete every document matching `filter`.
    fn delete_many<'a>(
        &'a self,
        cx: &'a Cx,
        filter: &'a Document,
    ) -> BoxFuture<'a, Outcome<DeleteSummary, Error>>;

    /// Insert a batch of documents as a single multi-insert operation.
    fn bulk_create<'a>(
        &'a self,
        cx: &'a Cx,
        documents: &'a [Document],
    ) -> BoxFuture<'a, Outcome<BulkSummary, Error>>;

    /// Indexes currently present on the collection, including the implicit
    /// primary-identifier index.
    fn list_indexes<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<Vec<IndexSpec>, Error>>;

    /// Create a secondary index.
    fn create_index<'a>(
        &'a self,
        cx: &'a Cx,
        index: &'a IndexSpec,
    ) -> BoxFuture<'a, Outcome<(), Error>>;

    /// Drop a secondary index.
    fn drop_index<'a>(
        &'a self,
        cx: &'a Cx,
        index: &'a IndexSpec,
    ) -> BoxFuture<'a, Outcome<(), Error>>;
}
