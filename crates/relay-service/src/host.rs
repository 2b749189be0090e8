//! Service host: registry plus lifecycle controller
//!
//! `ServiceHost` owns the registered services, the shared store and the broker
//! connection. On the broker's connect signal it runs `created` hooks, attaches a
//! storage adapter to every service, subscribes every method and finally runs
//! `mounted` hooks. Connection signals are re-emitted to observers as
//! [`HostEvent`]s; nothing is re-run on reconnect.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use relay_bus::{Connection, ConnectionEvent, ConnectionOptions, Connector};
use relay_common::{RelayError, Result};
use relay_storage::{KvStore, Storage, open_store};

use crate::config::RelayConfig;
use crate::context::ServiceContext;
use crate::descriptor::ServiceDescriptor;
use crate::event::{DEFAULT_EVENT_CAPACITY, HostEvent};
use crate::registry::{Registry, ServiceEntry};
use crate::router::{self, SubscriptionRecord};

#[derive(Default)]
struct HostState {
    registry: Registry,
    /// Set once the connect sequence has mounted the registered services
    mounted: bool,
}

struct HostInner {
    connector: Arc<dyn Connector>,
    store: Arc<dyn KvStore>,
    options: ConnectionOptions,
    state: Mutex<HostState>,
    connection: RwLock<Option<Arc<dyn Connection>>>,
    events: broadcast::Sender<HostEvent>,
    event_task: Mutex<Option<JoinHandle<()>>>,
    connect_lock: tokio::sync::Mutex<()>,
}

#[derive(Clone)]
pub struct ServiceHost {
    inner: Arc<HostInner>,
}

impl ServiceHost {
    pub fn new(
        connector: Arc<dyn Connector>,
        store: Arc<dyn KvStore>,
        options: ConnectionOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            inner: Arc::new(HostInner {
                connector,
                store,
                options,
                state: Mutex::new(HostState::default()),
                connection: RwLock::new(None),
                events,
                event_task: Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Open the configured store and build a host over it
    pub fn from_config(connector: Arc<dyn Connector>, config: &RelayConfig) -> Result<Self> {
        let store = open_store(&config.db)?;
        Ok(Self::new(connector, store, config.connection.clone()))
    }

    /// Register a service and return its context
    ///
    /// Runs `beforeCreate` and the data initializer. Registering a name again
    /// replaces the previous service entirely, revoking its subscriptions. A
    /// service registered after the host connected is mounted right away.
    pub fn register(&self, descriptor: ServiceDescriptor) -> Result<ServiceContext> {
        descriptor.validate()?;

        let name = descriptor.name().to_string();
        let context = ServiceContext::new(&name, descriptor.functions.clone());
        if let Some(hook) = &descriptor.before_create {
            hook(&context);
        }
        context.replace_data(descriptor.initial_data());

        let method_count = descriptor.methods.len();
        let (replaced, mount_now) = {
            let mut state = self.inner.state.lock();
            let replaced = state
                .registry
                .insert(ServiceEntry::new(descriptor.clone(), context.clone()));
            (replaced, state.mounted)
        };

        if let Some(previous) = replaced {
            info!(service = %name, "service re-registered, previous definition replaced");
            self.inner.retire(previous);
        }
        info!(service = %name, methods = method_count, "service registered");

        if mount_now && let Some(connection) = self.inner.current_connection() {
            if let Some(hook) = &descriptor.created {
                hook(&context);
            }
            self.inner.mount_service(&connection, &descriptor, &context);
            if let Some(hook) = &descriptor.mounted {
                hook(&context);
            }
        }
        Ok(context)
    }

    /// Connect to the broker and mount every registered service
    ///
    /// Resolves once the mount sequence has completed. Calling it again while
    /// connected does nothing.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.inner.connect_lock.lock().await;
        if self.inner.current_connection().is_some() {
            info!("service host already connected, ignoring connect");
            return Ok(());
        }

        let (connection, events) = self.inner.connector.connect(&self.inner.options).await?;
        *self.inner.connection.write() = Some(connection.clone());

        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(run_event_loop(
            Arc::downgrade(&self.inner),
            connection,
            events,
            ready_tx,
        ));
        if let Some(previous) = self.inner.event_task.lock().replace(task) {
            previous.abort();
        }

        if ready_rx.await.is_err() {
            warn!("broker event stream ended before the connect signal");
            if let Some(task) = self.inner.event_task.lock().take() {
                task.abort();
            }
            if let Some(connection) = self.inner.connection.write().take() {
                connection.close();
            }
            return Err(RelayError::Broker(
                "connection closed before the connect signal".to_string(),
            ));
        }
        info!(services = self.services().len(), "service host connected");
        Ok(())
    }

    /// Destroy one service: run `destroyed`, revoke its subscriptions and
    /// discard its context
    pub fn destroy(&self, name: &str) -> Result<()> {
        let entry = self
            .inner
            .state
            .lock()
            .registry
            .remove(name)
            .ok_or_else(|| RelayError::UnknownService(name.to_string()))?;

        if let Some(hook) = &entry.descriptor.destroyed {
            hook(&entry.context);
        }
        let revoked = entry.subscriptions.len();
        self.inner.retire(entry);
        info!(service = %name, subscriptions = revoked, "service destroyed");
        Ok(())
    }

    /// Destroy every service in registration order and close the connection
    pub fn close(&self) {
        for name in self.services() {
            if let Err(e) = self.destroy(&name) {
                debug!(service = %name, error = %e, "service already gone during close");
            }
        }
        self.inner.state.lock().mounted = false;

        if let Some(task) = self.inner.event_task.lock().take() {
            task.abort();
        }
        if let Some(connection) = self.inner.connection.write().take() {
            connection.close();
        }
        info!("service host closed");
    }

    /// Names of the registered services in registration order
    pub fn services(&self) -> Vec<String> {
        self.inner.state.lock().registry.names()
    }

    pub fn context(&self, name: &str) -> Result<ServiceContext> {
        self.inner
            .state
            .lock()
            .registry
            .get(name)
            .map(|entry| entry.context.clone())
            .ok_or_else(|| RelayError::UnknownService(name.to_string()))
    }

    /// Method subscriptions currently installed for a service
    pub fn subscriptions(&self, name: &str) -> Result<Vec<SubscriptionRecord>> {
        self.inner
            .state
            .lock()
            .registry
            .get(name)
            .map(|entry| entry.subscriptions.clone())
            .ok_or_else(|| RelayError::UnknownService(name.to_string()))
    }

    /// The active broker connection
    pub fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.inner
            .current_connection()
            .ok_or_else(|| RelayError::Broker("service host is not connected".to_string()))
    }

    pub fn is_connected(&self) -> bool {
        self.inner.current_connection().is_some()
    }

    /// Observe connection signals re-emitted by the host
    pub fn subscribe_events(&self) -> broadcast::Receiver<HostEvent> {
        self.inner.events.subscribe()
    }

    pub fn store(&self) -> Arc<dyn KvStore> {
        self.inner.store.clone()
    }
}

impl HostInner {
    fn current_connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection.read().clone()
    }

    fn emit(&self, event: HostEvent) {
        // No observers is fine
        let _ = self.events.send(event);
    }

    /// Run the connect sequence over every registered service
    fn mount_all(&self, connection: &Arc<dyn Connection>) {
        let snapshot: Vec<(ServiceDescriptor, ServiceContext)> = {
            let mut state = self.state.lock();
            state.mounted = true;
            state
                .registry
                .iter()
                .map(|entry| (entry.descriptor.clone(), entry.context.clone()))
                .collect()
        };

        for (descriptor, context) in &snapshot {
            if let Some(hook) = &descriptor.created {
                hook(context);
            }
        }
        for (descriptor, context) in &snapshot {
            self.mount_service(connection, descriptor, context);
        }
        for (descriptor, context) in &snapshot {
            if let Some(hook) = &descriptor.mounted {
                hook(context);
            }
        }
        info!(services = snapshot.len(), "services mounted");
    }

    /// Attach storage and subscribe every method of one service
    fn mount_service(
        &self,
        connection: &Arc<dyn Connection>,
        descriptor: &ServiceDescriptor,
        context: &ServiceContext,
    ) {
        let name = descriptor.name();
        context.attach(
            Storage::new(self.store.clone(), connection.clone(), name),
            connection.clone(),
        );

        let records = match router::install(connection, context, &descriptor.methods) {
            Ok(records) => records,
            Err(e) => {
                error!(service = %name, error = %e, "failed to subscribe service methods");
                self.emit(HostEvent::Err(e.to_string()));
                return;
            }
        };

        let mut state = self.state.lock();
        match state.registry.get_mut(name) {
            Some(entry) if entry.context.same(context) => {
                debug!(service = %name, subscriptions = records.len(), "service subscribed");
                entry.subscriptions = records;
            }
            _ => {
                // Replaced or destroyed while mounting
                drop(state);
                router::revoke(connection.as_ref(), &records);
                context.detach();
            }
        }
    }

    /// Release everything a service holds on the connection
    fn retire(&self, entry: ServiceEntry) {
        if !entry.subscriptions.is_empty() {
            match self.current_connection() {
                Some(connection) => router::revoke(connection.as_ref(), &entry.subscriptions),
                None => debug!(service = %entry.name(), "no connection, subscriptions already gone"),
            }
        }
        entry.context.detach();
    }
}

async fn run_event_loop(
    host: Weak<HostInner>,
    connection: Arc<dyn Connection>,
    mut events: broadcast::Receiver<ConnectionEvent>,
    ready: oneshot::Sender<()>,
) {
    let mut ready = Some(ready);
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "service host lagged behind connection events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(host) = host.upgrade() else {
            break;
        };

        match &event {
            ConnectionEvent::Connect => info!("broker connected"),
            ConnectionEvent::Error(message) => error!(error = %message, "broker connection error"),
            ConnectionEvent::Disconnect => warn!("broker disconnected"),
            ConnectionEvent::Reconnecting => info!("reconnecting to broker"),
            ConnectionEvent::Reconnect => info!("broker reconnected"),
        }
        let is_connect = event == ConnectionEvent::Connect;
        host.emit(HostEvent::from(event));

        if is_connect && let Some(ready) = ready.take() {
            host.mount_all(&connection);
            let _ = ready.send(());
        }
    }
    debug!("service host event loop stopped");
}
