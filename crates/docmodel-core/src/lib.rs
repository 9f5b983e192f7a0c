//! Core types and contracts for DocModel Rust.
//!
//! `docmodel-core` is the **foundation layer** for the entire workspace. It
//! defines the data model, field/validation pipeline, model registry, and the
//! store contracts that all other crates build on.
//!
//! # Role In The Architecture
//!
//! - **Data model**: [`Value`] and [`Document`] represent stored documents
//!   and compiled native filters alike.
//! - **Schema layer**: [`ModelDef`]/[`ModelSchema`] describe models;
//!   [`ModelRegistry`] resolves relations in two deterministic phases.
//! - **Store contract**: [`Dispatcher`] is the sole boundary to the document
//!   store; [`DatabaseManager`] resolves logical aliases to live handles.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from
//!   asupersync so every store round-trip is cancel-correct.
//!
//! # Who Uses This Crate
//!
//! - `docmodel-query` compiles query-node trees against [`ModelSchema`]s.
//! - `docmodel-session` runs querysets, instance lifecycles, and cascades on
//!   top of [`Dispatcher`].
//! - Driver crates (`docmodel-memory`) implement [`Dispatcher`] and
//!   [`Database`].
//!
//! Most applications should use the `docmodel` facade.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod field;
pub mod index;
pub mod registry;
pub mod schema;
pub mod validate;
pub mod value;

pub use connection::{Client, ClientFactory, ConnectionSettings, Database, DatabaseManager};
pub use dispatcher::{
    BoxFuture, BulkSummary, DeleteSummary, Dispatcher, DocumentCursor, FindOptions, SortKey,
    SortOrder, UpdateSummary,
};
pub use document::{Document, ID_FIELD};
pub use error::{
    Error, ProtectedError, QuerysetError, Result, SchemaError, SchemaErrorKind, SettingsError,
    StoreError, StoreErrorKind, ValidationError,
};
pub use field::{
    Choices, DefaultValue, FieldDescriptor, FieldKind, OnDelete, RelationDescriptor, RelationKind,
    RelationTarget, SaveAction,
};
pub use index::{IndexChanges, IndexSpec, declared_indexes, reconcile};
pub use registry::ModelRegistry;
pub use schema::{
    BackwardDescriptor, BackwardKind, FieldValidatorFn, ModelDef, ModelSchema,
    derive_collection_name,
};
pub use validate::{check_type, resolve_value, validate};
pub use value::Value;
