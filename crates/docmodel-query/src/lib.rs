//! Query-node expression trees and the native-filter compiler.
//!
//! `docmodel-query` is the **pure query layer**: it knows how to build filter
//! expression trees and lower them against a model schema, and nothing about
//! executing them.
//!
//! # Role In The Architecture
//!
//! - [`Q`]/[`QNode`] form the small expression-tree language callers combine
//!   with `&`, `|`, and `!`.
//! - [`compile`] simplifies a tree and lowers `field__operator` conditions to
//!   native filter documents, rewriting relation fields to their
//!   stored-identifier sub-path.
//! - [`invert_node`] and [`invert_filter`] implement `exclude` semantics:
//!   negation applied per node shape, after compilation for leaves.
//!
//! `docmodel-session` consumes this crate to accumulate queryset filters;
//! nothing here performs I/O.
//!
//! # Example
//!
//! ```
//! use docmodel_core::{FieldDescriptor, ModelDef, ModelRegistry};
//! use docmodel_query::{Q, compile};
//!
//! let mut registry = ModelRegistry::new();
//! registry
//!     .register(
//!         ModelDef::new("Profile")
//!             .field("username", FieldDescriptor::string())
//!             .field("age", FieldDescriptor::integer()),
//!     )
//!     .unwrap();
//! registry.resolve_relations().unwrap();
//!
//! let schema = registry.schema("Profile").unwrap();
//! let node = Q::with("age__gt", 18) | Q::with("username", "Ivan");
//! let filter = compile(&node, schema).unwrap();
//! assert!(filter.get("$or").is_some());
//! ```

pub mod compiler;
pub mod node;
mod operators;

pub use compiler::{DELIMITER, compile, invert_filter, invert_node};
pub use node::{CombineOp, Conditions, Q, QCombination, QNode};
