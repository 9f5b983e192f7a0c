//! DocModel: an asynchronous document mapper for Rust.
//!
//! Declare schema-typed models once at startup, then filter, traverse
//! relations, and persist documents through a typed, cancel-correct API.
//! This facade re-exports the whole stack:
//!
//! - `docmodel-core`: values, documents, field descriptors, validation,
//!   the model registry, and the store contracts.
//! - `docmodel-query`: `Q` expression trees and the native-filter compiler.
//! - `docmodel-session`: the `Odm` handle, querysets, instance lifecycle,
//!   and the on-delete cascade engine.
//!
//! # Quick start
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! let mut registry = ModelRegistry::new();
//! registry.register(
//!     ModelDef::new("User").field("username", FieldDescriptor::string().max_length(20)),
//! )?;
//! registry.register(
//!     ModelDef::new("Post")
//!         .field("author", FieldDescriptor::foreign_key("User").on_delete(OnDelete::Cascade)),
//! )?;
//! registry.resolve_relations()?;
//!
//! let odm = Odm::new(registry, databases)?;
//! let mike = odm.objects("User")?
//!     .get(&cx, Q::with("username", "Mike"))
//!     .await?;
//! ```

pub use asupersync::{Cx, Outcome};

pub use docmodel_core::{
    BackwardDescriptor, BackwardKind, BoxFuture, BulkSummary, Choices, Client, ClientFactory,
    ConnectionSettings, Database, DatabaseManager, DefaultValue, DeleteSummary, Dispatcher,
    Document, DocumentCursor, Error, FieldDescriptor, FieldKind, FieldValidatorFn, FindOptions,
    ID_FIELD, IndexChanges, IndexSpec, ModelDef, ModelRegistry, ModelSchema, OnDelete,
    ProtectedError, QuerysetError, RelationDescriptor, RelationKind, RelationTarget, Result,
    SaveAction, SchemaError, SchemaErrorKind, SettingsError, SortKey, SortOrder, StoreError,
    StoreErrorKind, UpdateSummary, ValidationError, Value, derive_collection_name,
};
pub use docmodel_query::{
    CombineOp, Conditions, DELIMITER, Q, QCombination, QNode, compile, invert_filter, invert_node,
};
pub use docmodel_session::{Instance, Odm, QuerySet};

/// The usual imports for applications.
pub mod prelude {
    pub use crate::{
        ConnectionSettings, Cx, DatabaseManager, Document, Error, FieldDescriptor, Instance,
        ModelDef, ModelRegistry, Odm, OnDelete, Outcome, Q, QNode, QuerySet, Result, Value,
    };
}
