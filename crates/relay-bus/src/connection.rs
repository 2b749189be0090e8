//! Broker client traits
//!
//! The service layer only talks to the broker through these traits, so any
//! pub/sub transport with subject routing and reply addresses can back it.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::model::{ConnectionEvent, Message, RequestOptions, SubscriptionId};
use crate::options::ConnectionOptions;

/// Callback invoked for every message delivered to a subscription
pub type MessageHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure into a [`MessageHandler`]
pub fn handler_fn<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |msg| Box::pin(f(msg)))
}

/// An established broker connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Install a subscription; `subject` may contain wildcards
    fn subscribe(&self, subject: &str, handler: MessageHandler) -> Result<SubscriptionId>;

    /// Revoke one subscription. Handlers already running are not cancelled.
    fn unsubscribe(&self, sid: SubscriptionId) -> Result<()>;

    /// Fire-and-forget publish
    fn publish(&self, subject: &str, payload: Value) -> Result<()>;

    /// Publish carrying a reply address
    fn publish_request(&self, subject: &str, reply: &str, payload: Value) -> Result<()>;

    /// Publish and wait for the first reply
    async fn request(&self, subject: &str, payload: Value, options: RequestOptions)
    -> Result<Value>;

    /// Close the connection; later calls fail with `BusError::Closed`
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Factory establishing broker connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and return the connection together with its event stream.
    ///
    /// The receiver is subscribed before `ConnectionEvent::Connect` is emitted,
    /// so the caller always observes the initial connect signal.
    async fn connect(
        &self,
        options: &ConnectionOptions,
    ) -> Result<(Arc<dyn Connection>, broadcast::Receiver<ConnectionEvent>)>;
}
