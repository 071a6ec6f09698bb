//! Client registry
//!
//! Maps a URI scheme to the factory that builds clients for it. New schemes
//! are added with [`Registry::register`] without touching dispatch logic;
//! registration goes through a shared reference so a scheme can be swapped
//! on a live dispatcher.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::resolver::ConnectionDescriptor;

/// Builds a client for a resolved connection
pub trait ClientFactory: Send + Sync {
    fn create(&self, descriptor: &ConnectionDescriptor) -> Result<Arc<dyn Client>>;
}

impl<F> ClientFactory for F
where
    F: Fn(&ConnectionDescriptor) -> Result<Arc<dyn Client>> + Send + Sync,
{
    fn create(&self, descriptor: &ConnectionDescriptor) -> Result<Arc<dyn Client>> {
        self(descriptor)
    }
}

struct Registration {
    factory: Arc<dyn ClientFactory>,
    pooled: bool,
}

/// Scheme → factory table plus the pool of shared clients
#[derive(Default)]
pub struct Registry {
    factories: RwLock<HashMap<String, Registration>>,
    pool: Mutex<HashMap<String, Arc<dyn Client>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory; a later registration for the same scheme wins
    pub fn register<F>(&self, scheme: &str, factory: F)
    where
        F: ClientFactory + 'static,
    {
        self.insert(scheme, Arc::new(factory), false);
    }

    /// Register a factory whose clients are cached per resolved URI
    ///
    /// Only suitable for clients that allow concurrent streams.
    pub fn register_pooled<F>(&self, scheme: &str, factory: F)
    where
        F: ClientFactory + 'static,
    {
        self.insert(scheme, Arc::new(factory), true);
    }

    fn insert(&self, scheme: &str, factory: Arc<dyn ClientFactory>, pooled: bool) {
        let scheme = scheme.to_ascii_lowercase();
        let previous = self
            .factories
            .write()
            .insert(scheme.clone(), Registration { factory, pooled });
        if previous.is_some() {
            tracing::debug!(scheme = %scheme, "Replaced client factory");
        } else {
            tracing::debug!(scheme = %scheme, pooled, "Registered client factory");
        }

        let prefix = format!("{scheme}:");
        self.pool.lock().retain(|key, _| !key.starts_with(&prefix));
    }

    /// Build (or reuse) a client for the descriptor's scheme
    pub fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Arc<dyn Client>> {
        let scheme = descriptor.uri.scheme();
        let (factory, pooled) = {
            let factories = self.factories.read();
            let registration = factories
                .get(scheme)
                .ok_or_else(|| Error::UnsupportedScheme(scheme.to_string()))?;
            (Arc::clone(&registration.factory), registration.pooled)
        };

        if !pooled {
            tracing::debug!(target = %descriptor.target(), "Opening client");
            return factory.create(descriptor);
        }

        let key = pool_key(descriptor);
        if let Some(client) = self.pool.lock().get(&key) {
            tracing::debug!(target = %descriptor.target(), "Reusing pooled client");
            return Ok(Arc::clone(client));
        }

        tracing::debug!(target = %descriptor.target(), "Opening pooled client");
        let client = factory.create(descriptor)?;
        let mut pool = self.pool.lock();
        Ok(Arc::clone(pool.entry(key).or_insert(client)))
    }

    pub fn is_registered(&self, scheme: &str) -> bool {
        self.factories
            .read()
            .contains_key(&scheme.to_ascii_lowercase())
    }

    /// Registered schemes in sorted order
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.factories.read().keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Drop every pooled client
    pub fn clear_pool(&self) {
        self.pool.lock().clear();
    }

    pub fn pooled_clients(&self) -> usize {
        self.pool.lock().len()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("schemes", &self.schemes())
            .field("pooled_clients", &self.pooled_clients())
            .finish()
    }
}

/// Pool identity: everything that shapes the connection, never the path
fn pool_key(descriptor: &ConnectionDescriptor) -> String {
    let uri = &descriptor.uri;
    let mut key = format!(
        "{}:{}:{}@{}:{}#{}/{}",
        uri.scheme(),
        uri.username().unwrap_or_default(),
        uri.password().map(|p| p.expose()).unwrap_or_default(),
        uri.host().unwrap_or_default(),
        uri.port().map(|p| p.to_string()).unwrap_or_default(),
        descriptor.timeouts.connect_ms,
        descriptor.timeouts.io_ms,
    );
    for (name, value) in uri.query() {
        let _ = write!(key, "&{name}={value}");
    }
    key
}
