//! Runtime layer for DocModel Rust: querysets, instance lifecycle, and
//! cascading deletes.
//!
//! # Role In The Architecture
//!
//! - [`Odm`] is the explicitly-threaded handle over the resolved model
//!   registry and the database manager; there is no global state.
//! - [`QuerySet`] accumulates compiled filters and lazily materializes typed
//!   [`Instance`]s through the dispatcher contract.
//! - [`Instance`] owns per-document state: external values, the
//!   modified-field set that scopes update payloads, and the save/delete
//!   lifecycle.
//! - The on-delete engine walks backward relations depth-first, refusing the
//!   whole delete on a protected relation before touching anything.
//!
//! # Design Philosophy
//!
//! - **Explicit over implicit**: field access is `get`/`set`, dirty tracking
//!   is a visible set, relation reads are factories rather than cached
//!   awaitables.
//! - **Cancel-correct**: every store round-trip is `Cx` + `Outcome`; the
//!   cancellation and panic legs propagate verbatim.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = ModelRegistry::new();
//! registry.register(ModelDef::new("User").field("username", FieldDescriptor::string()))?;
//! registry.resolve_relations()?;
//! let odm = Odm::new(registry, databases)?;
//!
//! let mut user = odm.new_instance("User")?;
//! user.set("username", "Mike");
//! user.save(&cx).await?;
//!
//! let found = odm.objects("User")?.get(&cx, Q::with("username", "Mike")).await?;
//! ```

pub mod instance;
pub mod odm;
mod on_delete;
pub mod queryset;

pub use instance::Instance;
pub use odm::Odm;
pub use queryset::QuerySet;
