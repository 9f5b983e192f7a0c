//! Database resolution: aliases, clients, and connection settings.
//!
//! Models name a logical database alias; the [`DatabaseManager`] resolves it
//! to a live [`Database`] handle, sharing one [`Client`] per `(host, port)`
//! pair across aliases and passing per-alias credentials through to the
//! driver.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};

/// Connection settings for one database alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    /// Database name on the server
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionSettings {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: None,
            password: None,
        }
    }

    /// Set credentials for this alias.
    #[must_use]
    pub fn credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    fn client_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A live database handle: hands out collection-scoped dispatchers.
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    /// Dispatcher for one collection of this database.
    fn dispatcher(&self, collection: &str) -> Arc<dyn Dispatcher>;
}

/// A server client, shared across every alias pointing at the same
/// `(host, port)`.
pub trait Client: Send + Sync {
    /// Open (or reuse) a database on this client, authenticating with the
    /// given credentials when present.
    fn database(
        &self,
        name: &str,
        credentials: Option<(&str, &str)>,
    ) -> Result<Arc<dyn Database>>;
}

/// Connects clients; implemented by drivers.
pub trait ClientFactory: Send + Sync {
    fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Client>>;
}

/// Resolves logical database aliases to live handles.
///
/// Read-mostly after startup: aliases are added during initialization and the
/// caches only fill in. Missing aliases surface as settings errors.
pub struct DatabaseManager {
    factory: Arc<dyn ClientFactory>,
    settings: BTreeMap<String, ConnectionSettings>,
    clients: Mutex<BTreeMap<String, Arc<dyn Client>>>,
    databases: Mutex<BTreeMap<String, Arc<dyn Database>>>,
}

impl DatabaseManager {
    #[must_use]
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            settings: BTreeMap::new(),
            clients: Mutex::new(BTreeMap::new()),
            databases: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register settings for an alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>, settings: ConnectionSettings) -> Self {
        self.settings.insert(alias.into(), settings);
        self
    }

    fn settings_for(&self, alias: &str) -> Result<&ConnectionSettings> {
        self.settings.get(alias).ok_or_else(|| {
            Error::settings(format!(
                "Can't find settings for '{alias}' database! \
                 Please, specify the '{alias}' database in your settings."
            ))
        })
    }

    /// Database name configured for an alias.
    pub fn database_name(&self, alias: &str) -> Result<String> {
        Ok(self.settings_for(alias)?.database.clone())
    }

    /// Resolve an alias to a live database handle, caching both the database
    /// and the underlying client (keyed by `host:port`).
    pub fn database(&self, alias: &str) -> Result<Arc<dyn Database>> {
        if let Ok(databases) = self.databases.lock() {
            if let Some(db) = databases.get(alias) {
                return Ok(Arc::clone(db));
            }
        }

        let settings = self.settings_for(alias)?;
        let client = self.client_for(settings)?;

        let credentials = match (&settings.username, &settings.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        };
        let database = client.database(&settings.database, credentials)?;

        if let Ok(mut databases) = self.databases.lock() {
            databases.insert(alias.to_string(), Arc::clone(&database));
        }
        Ok(database)
    }

    fn client_for(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Client>> {
        let key = settings.client_key();
        if let Ok(clients) = self.clients.lock() {
            if let Some(client) = clients.get(&key) {
                return Ok(Arc::clone(client));
            }
        }
        let client = self.factory.connect(settings)?;
        if let Ok(mut clients) = self.clients.lock() {
            clients.insert(key, Arc::clone(&client));
        }
        Ok(client)
    }
}

impl std::fmt::Debug for DatabaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseManager")
            .field("aliases", &self.settings.keys().collect::<Vec<_>>())
            .finish()
    }
}
