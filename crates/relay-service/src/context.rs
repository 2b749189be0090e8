//! Runtime state of one registered service
//!
//! A `ServiceContext` is created once at registration and handed to every hook,
//! method and local function of that service. Clones share the same state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use relay_bus::Connection;
use relay_common::{RelayError, Result};
use relay_storage::Storage;

/// Local function bound to a service context
pub type LocalFunction = Arc<dyn Fn(&ServiceContext) -> Value + Send + Sync>;

struct ContextInner {
    service: String,
    functions: HashMap<String, LocalFunction>,
    data: RwLock<Map<String, Value>>,
    storage: RwLock<Option<Storage>>,
    connection: RwLock<Option<Arc<dyn Connection>>>,
}

#[derive(Clone)]
pub struct ServiceContext {
    inner: Arc<ContextInner>,
}

impl ServiceContext {
    pub(crate) fn new(service: impl Into<String>, functions: HashMap<String, LocalFunction>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                service: service.into(),
                functions,
                data: RwLock::new(Map::new()),
                storage: RwLock::new(None),
                connection: RwLock::new(None),
            }),
        }
    }

    /// Name of the service this context belongs to
    pub fn service(&self) -> &str {
        &self.inner.service
    }

    /// Invoke a local function of this service
    pub fn call(&self, name: &str) -> Result<Value> {
        let function = self
            .inner
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| RelayError::NotAFunction(name.to_string()))?;
        Ok(function(self))
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.inner.functions.contains_key(name)
    }

    /// Snapshot of the service state
    pub fn data(&self) -> Map<String, Value> {
        self.inner.data.read().clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.data.read().get(key).cloned()
    }

    /// Set one state entry, returning the previous value
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.data.write().insert(key.into(), value)
    }

    /// Mutate the state under one write lock
    pub fn update_data<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        f(&mut self.inner.data.write())
    }

    pub(crate) fn replace_data(&self, data: Map<String, Value>) {
        *self.inner.data.write() = data;
    }

    /// Storage adapter of this service; available once the host has connected
    pub fn storage(&self) -> Result<Storage> {
        self.inner
            .storage
            .read()
            .clone()
            .ok_or_else(|| self.not_connected())
    }

    /// Broker connection, for subscribing to change subjects or calling other
    /// services
    pub fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.inner
            .connection
            .read()
            .clone()
            .ok_or_else(|| self.not_connected())
    }

    /// Whether both handles point at the same service state
    pub(crate) fn same(&self, other: &ServiceContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_attached(&self) -> bool {
        self.inner.storage.read().is_some()
    }

    pub(crate) fn attach(&self, storage: Storage, connection: Arc<dyn Connection>) {
        *self.inner.storage.write() = Some(storage);
        *self.inner.connection.write() = Some(connection);
    }

    pub(crate) fn detach(&self) {
        self.inner.storage.write().take();
        self.inner.connection.write().take();
    }

    fn not_connected(&self) -> RelayError {
        RelayError::Broker(format!("service '{}' is not connected", self.inner.service))
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("service", &self.inner.service)
            .field("functions", &self.inner.functions.keys().collect::<Vec<_>>())
            .field("attached", &self.is_attached())
            .finish()
    }
}
