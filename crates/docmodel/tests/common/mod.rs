//! Shared fixtures for the scenario tests: an asupersync runtime driver and
//! memory-backed ODM builders.

use std::sync::Arc;

use asupersync::runtime::RuntimeBuilder;
use docmodel::{ConnectionSettings, Cx, DatabaseManager, Error, Outcome};
use docmodel_memory::{MemoryClientFactory, OpLog};

pub fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
    }
}

pub fn run(f: impl AsyncFnOnce(Cx)) {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async move { f(cx).await });
}

/// A database manager over a fresh in-memory store, plus the store's op log.
pub fn memory_manager() -> (DatabaseManager, OpLog) {
    let log = OpLog::new();
    let factory = MemoryClientFactory::with_log(log.clone());
    let manager = DatabaseManager::new(Arc::new(factory))
        .alias("default", ConnectionSettings::new("localhost", 27017, "test"));
    (manager, log)
}
