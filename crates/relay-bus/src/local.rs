//! In-process broker
//!
//! `LocalBroker` keeps every subscription of every client in one table and
//! routes published messages by subject pattern. Each subscription owns a
//! delivery task, so messages for one subscription are handled sequentially in
//! publish order while different subscriptions run concurrently.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use relay_common::{INBOX_PREFIX, generate_id};

use crate::connection::{Connection, Connector, MessageHandler, handler_fn};
use crate::error::{BusError, Result};
use crate::model::{ConnectionEvent, Message, RequestOptions, SubscriptionId};
use crate::options::{ConnectionOptions, PayloadEncoding};
use crate::subject::{matches, validate_pattern, validate_subject};

const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Per-client state shared between the broker and the connection handle
struct ClientState {
    id: u64,
    name: Option<String>,
    events: broadcast::Sender<ConnectionEvent>,
    online: AtomicBool,
    closed: AtomicBool,
    encoding: PayloadEncoding,
}

impl ClientState {
    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine; nobody is observing this client
        let _ = self.events.send(event);
    }

    fn is_reachable(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.online.load(Ordering::SeqCst)
    }
}

struct LocalSubscription {
    client: Arc<ClientState>,
    pattern: String,
    tx: mpsc::UnboundedSender<Message>,
    /// Cleared on explicit unsubscribe so queued messages are dropped
    active: Arc<AtomicBool>,
    /// Deliveries left before the subscription removes itself
    remaining: Option<Arc<AtomicUsize>>,
}

#[derive(Default)]
struct BrokerInner {
    subscriptions: DashMap<u64, LocalSubscription>,
    clients: DashMap<u64, Arc<ClientState>>,
    next_sid: AtomicU64,
    next_client: AtomicU64,
}

impl BrokerInner {
    fn route(&self, msg: Message) -> usize {
        let mut delivered = 0;
        let mut expired = Vec::new();

        for entry in self.subscriptions.iter() {
            let sub = entry.value();
            if !sub.client.is_reachable() || !matches(&sub.pattern, &msg.subject) {
                continue;
            }
            if let Some(remaining) = &sub.remaining {
                let Ok(left) = remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    n.checked_sub(1)
                }) else {
                    continue;
                };
                if left == 1 {
                    expired.push(*entry.key());
                }
            }
            if sub.tx.send(msg.clone()).is_ok() {
                delivered += 1;
            }
        }

        // Removing drops the sender; the delivery task drains what is queued and exits
        for sid in expired {
            self.subscriptions.remove(&sid);
        }
        delivered
    }

    fn has_interest(&self, subject: &str) -> bool {
        self.subscriptions
            .iter()
            .any(|entry| entry.client.is_reachable() && matches(&entry.pattern, subject))
    }

    fn remove_client_subscriptions(&self, client_id: u64) {
        self.subscriptions.retain(|_, sub| {
            if sub.client.id == client_id {
                sub.active.store(false, Ordering::SeqCst);
                false
            } else {
                true
            }
        });
    }
}

/// In-process pub/sub broker with NATS-style subject semantics
#[derive(Clone, Default)]
pub struct LocalBroker {
    inner: Arc<BrokerInner>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a client connection without going through [`Connector`]
    pub fn open_connection(&self, options: &ConnectionOptions) -> LocalConnection {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        let id = self.inner.next_client.fetch_add(1, Ordering::SeqCst);
        let client = Arc::new(ClientState {
            id,
            name: options.name.clone(),
            events,
            online: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            encoding: options.encoding,
        });
        self.inner.clients.insert(id, client.clone());
        LocalConnection {
            client,
            broker: self.inner.clone(),
        }
    }

    /// Drop the link of every client: emits `Disconnect` then `Reconnecting`
    pub fn disconnect_all(&self) {
        for entry in self.inner.clients.iter() {
            let client = entry.value();
            client.online.store(false, Ordering::SeqCst);
            client.emit(ConnectionEvent::Disconnect);
            client.emit(ConnectionEvent::Reconnecting);
        }
        warn!("local broker dropped all client links");
    }

    /// Restore the link of every client and emit `Reconnect`
    pub fn reconnect_all(&self) {
        for entry in self.inner.clients.iter() {
            let client = entry.value();
            client.online.store(true, Ordering::SeqCst);
            client.emit(ConnectionEvent::Reconnect);
        }
        info!("local broker restored all client links");
    }

    /// Report an asynchronous error to every client
    pub fn emit_error(&self, message: &str) {
        for entry in self.inner.clients.iter() {
            entry.value().emit(ConnectionEvent::Error(message.to_string()));
        }
    }

    /// Number of live subscriptions across all clients
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// Number of open client connections
    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }
}

#[async_trait]
impl Connector for LocalBroker {
    async fn connect(
        &self,
        options: &ConnectionOptions,
    ) -> Result<(Arc<dyn Connection>, broadcast::Receiver<ConnectionEvent>)> {
        let conn = self.open_connection(options);
        let events = conn.client.events.subscribe();
        info!(
            client = conn.client.id,
            name = conn.client.name.as_deref().unwrap_or(""),
            servers = ?options.servers,
            "local broker connection established"
        );
        conn.client.emit(ConnectionEvent::Connect);
        Ok((Arc::new(conn), events))
    }
}

/// Client handle onto a [`LocalBroker`]
pub struct LocalConnection {
    client: Arc<ClientState>,
    broker: Arc<BrokerInner>,
}

impl LocalConnection {
    /// Subscribe to this client's connection events
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.client.events.subscribe()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.client.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        if !self.client.online.load(Ordering::SeqCst) {
            return Err(BusError::NotConnected);
        }
        Ok(())
    }

    fn encode(&self, payload: Value) -> Value {
        match (self.client.encoding, payload) {
            (PayloadEncoding::String, Value::String(s)) => Value::String(s),
            (PayloadEncoding::String, other) => Value::String(other.to_string()),
            (PayloadEncoding::Json, other) => other,
        }
    }

    fn subscribe_inner(
        &self,
        subject: &str,
        handler: MessageHandler,
        max: Option<usize>,
    ) -> Result<SubscriptionId> {
        if self.client.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        validate_pattern(subject)?;

        let sid = self.broker.next_sid.fetch_add(1, Ordering::SeqCst);
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let active = Arc::new(AtomicBool::new(true));

        let task_active = active.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if !task_active.load(Ordering::SeqCst) {
                    break;
                }
                handler(msg).await;
            }
        });

        self.broker.subscriptions.insert(
            sid,
            LocalSubscription {
                client: self.client.clone(),
                pattern: subject.to_string(),
                tx,
                active,
                remaining: max.map(|m| Arc::new(AtomicUsize::new(m))),
            },
        );
        debug!(client = self.client.id, sid, subject, "subscription installed");
        Ok(SubscriptionId(sid))
    }

    fn publish_inner(&self, subject: &str, reply: Option<&str>, payload: Value) -> Result<()> {
        self.ensure_open()?;
        validate_subject(subject)?;
        let msg = Message {
            subject: subject.to_string(),
            payload: self.encode(payload),
            reply: reply.map(str::to_string),
        };
        let delivered = self.broker.route(msg);
        debug!(client = self.client.id, subject, delivered, "message published");
        Ok(())
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn subscribe(&self, subject: &str, handler: MessageHandler) -> Result<SubscriptionId> {
        self.subscribe_inner(subject, handler, None)
    }

    fn unsubscribe(&self, sid: SubscriptionId) -> Result<()> {
        let owned = self
            .broker
            .subscriptions
            .remove_if(&sid.0, |_, sub| sub.client.id == self.client.id);
        match owned {
            Some((_, sub)) => {
                sub.active.store(false, Ordering::SeqCst);
                debug!(client = self.client.id, sid = sid.0, "subscription revoked");
                Ok(())
            }
            None => Err(BusError::UnknownSubscription(sid.0)),
        }
    }

    fn publish(&self, subject: &str, payload: Value) -> Result<()> {
        self.publish_inner(subject, None, payload)
    }

    fn publish_request(&self, subject: &str, reply: &str, payload: Value) -> Result<()> {
        self.publish_inner(subject, Some(reply), payload)
    }

    async fn request(
        &self,
        subject: &str,
        payload: Value,
        options: RequestOptions,
    ) -> Result<Value> {
        self.ensure_open()?;
        validate_subject(subject)?;
        if !self.broker.has_interest(subject) {
            return Err(BusError::NoResponders(subject.to_string()));
        }

        let inbox = format!("{}.{}", INBOX_PREFIX, generate_id());
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let max = options.max.unwrap_or(1).max(1);
        let sid = self.subscribe_inner(
            &inbox,
            handler_fn(move |msg: Message| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(msg.payload);
                }
            }),
            Some(max),
        )?;

        if let Err(e) = self.publish_request(subject, &inbox, payload) {
            let _ = self.unsubscribe(sid);
            return Err(e);
        }

        let reply = match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx.recv())
                .await
                .map_err(|_| BusError::Timeout),
            None => Ok(rx.recv().await),
        };
        // Already gone when `max` replies arrived
        let _ = self.unsubscribe(sid);

        match reply {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(BusError::Closed),
            Err(e) => Err(e),
        }
    }

    fn close(&self) {
        if self.client.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.broker.remove_client_subscriptions(self.client.id);
        self.broker.clients.remove(&self.client.id);
        info!(client = self.client.id, "local broker connection closed");
    }

    fn is_closed(&self) -> bool {
        self.client.closed.load(Ordering::SeqCst)
    }
}
