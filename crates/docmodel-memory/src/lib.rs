//! In-memory document store for DocModel Rust.
//!
//! `docmodel-memory` fills the driver slot behind the dispatcher contract:
//! a process-local store with real filter evaluation, sorting, projection,
//! unique-index enforcement, and an operation log. Integration tests run the
//! whole mapper against it; applications can use it for prototyping.
//!
//! # Role In The Architecture
//!
//! - Implements [`docmodel_core::Dispatcher`] per collection and
//!   [`docmodel_core::Database`]/[`docmodel_core::Client`] around them.
//! - Evaluates compiled native filters (`$and`/`$or`/`$not`/`$gt`/…,
//!   dotted paths, reference `.$id` hops) over stored documents.
//! - Surfaces unique-index violations as duplicate-key store errors,
//!   propagated unwrapped like any store-native failure.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use docmodel_core::{ConnectionSettings, DatabaseManager};
//! use docmodel_memory::MemoryClientFactory;
//!
//! let factory = MemoryClientFactory::new();
//! let databases = DatabaseManager::new(Arc::new(factory))
//!     .alias("default", ConnectionSettings::new("localhost", 27017, "app"));
//! let db = databases.database("default").unwrap();
//! let users = db.dispatcher("user");
//! assert_eq!(users.collection_name(), "user");
//! ```

mod filter;
mod store;

pub use filter::{matches, order_values};
pub use store::{MemoryClient, MemoryClientFactory, MemoryCollection, MemoryDatabase, OpLog};

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use asupersync::{Cx, Outcome};
    use docmodel_core::{
        Database, Dispatcher, Document, Error, FindOptions, SortKey, Value,
    };

    fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
        }
    }

    fn run(f: impl AsyncFnOnce(Cx)) {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        rt.block_on(async move { f(cx).await });
    }

    fn users_dispatcher() -> std::sync::Arc<dyn Dispatcher> {
        MemoryDatabase::new("test", OpLog::new()).dispatcher("user")
    }

    #[test]
    fn test_create_assigns_monotonic_identifiers() {
        run(async |cx| {
            let users = users_dispatcher();
            let first = unwrap_outcome(
                users
                    .create(&cx, &Document::from([("name", Value::from("a"))]))
                    .await,
            );
            let second = unwrap_outcome(
                users
                    .create(&cx, &Document::from([("name", Value::from("b"))]))
                    .await,
            );
            assert_eq!(first.get("_id"), Some(&Value::Int(1)));
            assert_eq!(second.get("_id"), Some(&Value::Int(2)));
        });
    }

    #[test]
    fn test_get_semantics() {
        run(async |cx| {
            let users = users_dispatcher();
            let empty = Document::new();

            match users.get(&cx, &empty, &empty).await {
                Outcome::Err(Error::DoesNotExist(_)) => {}
                other => panic!("{other:?}"),
            }

            for name in ["a", "b"] {
                unwrap_outcome(
                    users
                        .create(&cx, &Document::from([("name", Value::from(name))]))
                        .await,
                );
            }
            match users.get(&cx, &empty, &empty).await {
                Outcome::Err(Error::MultipleObjectsReturned(_)) => {}
                other => panic!("{other:?}"),
            }

            let one = unwrap_outcome(
                users
                    .get(&cx, &empty, &Document::from([("name", Value::from("a"))]))
                    .await,
            );
            assert_eq!(one.get("name"), Some(&Value::from("a")));
        });
    }

    #[test]
    fn test_find_sort_skip_limit() {
        run(async |cx| {
            let users = users_dispatcher();
            for age in [30, 20, 18] {
                unwrap_outcome(
                    users
                        .create(&cx, &Document::from([("age", Value::Int(age))]))
                        .await,
                );
            }

            let options = FindOptions {
                sort: vec![SortKey::parse("-age")],
                skip: Some(1),
                limit: Some(1),
                projection: Document::new(),
            };
            let Outcome::Ok(mut cursor) = users.find(&cx, &Document::new(), options).await
            else {
                std::panic::panic_any("find returned a non-ok outcome".to_string());
            };
            let doc = unwrap_outcome(cursor.next(&cx).await).expect("one document");
            assert_eq!(doc.get("age"), Some(&Value::Int(20)));
            assert!(unwrap_outcome(cursor.next(&cx).await).is_none());
        });
    }

    #[test]
    fn test_projection_include_and_slice() {
        run(async |cx| {
            let users = users_dispatcher();
            unwrap_outcome(
                users
                    .create(
                        &cx,
                        &Document::from([
                            ("name", Value::from("a")),
                            ("age", Value::Int(30)),
                            (
                                "docs",
                                Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
                            ),
                        ]),
                    )
                    .await,
            );

            let projection = Document::from([
                ("name", Value::Bool(true)),
                (
                    "docs",
                    Value::Document(Document::from([("$slice", Value::Int(2))])),
                ),
            ]);
            let doc = unwrap_outcome(users.get(&cx, &projection, &Document::new()).await);
            assert!(doc.get("name").is_some());
            assert!(doc.get("_id").is_some());
            assert!(doc.get("age").is_none());
        });
    }

    #[test]
    fn test_update_one_returns_post_image() {
        run(async |cx| {
            let users = users_dispatcher();
            let created = unwrap_outcome(
                users
                    .create(
                        &cx,
                        &Document::from([("name", Value::from("a")), ("age", Value::Int(1))]),
                    )
                    .await,
            );
            let id = created.get("_id").cloned().expect("identifier");

            let post = unwrap_outcome(
                users
                    .update_one(&cx, &id, &Document::from([("age", Value::Int(2))]))
                    .await,
            );
            assert_eq!(post.get("age"), Some(&Value::Int(2)));
            assert_eq!(post.get("name"), Some(&Value::from("a")));
        });
    }

    #[test]
    fn test_op_log_records_order() {
        run(async |cx| {
            let log = OpLog::new();
            let db = MemoryDatabase::new("test", log.clone());
            let users = db.dispatcher("user");
            let posts = db.dispatcher("post");

            unwrap_outcome(users.create(&cx, &Document::new()).await);
            unwrap_outcome(posts.delete_many(&cx, &Document::new()).await);
            unwrap_outcome(users.delete_one(&cx, &Document::new()).await);

            assert_eq!(
                log.entries(),
                vec!["create user", "delete_many post", "delete_one user"]
            );
        });
    }
}
