//! Common test utilities for integration testing
//!
//! This module provides shared test infrastructure including:
//! - TestHost: a service host over an in-process broker and store
//! - ChangeListener: collects change events published on a subject pattern
//! - Canned services used across the suites

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use relay_service::{
    Connection, ConnectionOptions, LocalBroker, Message, Reply, RequestOptions, ServiceDescriptor,
    ServiceHost, handler_fn,
};
use relay_storage::{KvStore, MemoryStore};

/// How long a test waits for something that should arrive
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a test waits to be sure something does not arrive
pub const QUIET_PERIOD: Duration = Duration::from_millis(150);

pub struct TestHost {
    pub broker: LocalBroker,
    pub store: Arc<MemoryStore>,
    pub host: ServiceHost,
    /// Independent client, standing in for another process on the bus
    pub client: Arc<dyn Connection>,
}

impl TestHost {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_store(store.clone(), store)
    }

    pub fn with_store(store: Arc<MemoryStore>, kv: Arc<dyn KvStore>) -> Self {
        let broker = LocalBroker::new();
        let host = ServiceHost::new(Arc::new(broker.clone()), kv, ConnectionOptions::default());
        let client: Arc<dyn Connection> =
            Arc::new(broker.open_connection(&ConnectionOptions::default()));
        Self {
            broker,
            store,
            host,
            client,
        }
    }

    /// Request `{service}.{method}` from the independent client
    pub async fn call(&self, subject: &str, payload: Value) -> relay_service::Result<Value> {
        Ok(self
            .client
            .request(
                subject,
                payload,
                RequestOptions::max(1).with_timeout(RECV_TIMEOUT),
            )
            .await?)
    }
}

/// Collects every message published on a subject pattern
pub struct ChangeListener {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl ChangeListener {
    pub fn subscribe(connection: &Arc<dyn Connection>, pattern: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        connection
            .subscribe(
                pattern,
                handler_fn(move |msg: Message| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(msg);
                    }
                }),
            )
            .expect("subscribe change listener");
        Self { rx }
    }

    pub async fn next(&mut self) -> Message {
        tokio::time::timeout(RECV_TIMEOUT, self.rx.recv())
            .await
            .expect("no message within timeout")
            .expect("listener channel closed")
    }

    /// Assert nothing else arrives within the quiet period
    pub async fn assert_quiet(&mut self) {
        let extra = tokio::time::timeout(QUIET_PERIOD, self.rx.recv()).await;
        assert!(extra.is_err(), "unexpected message: {:?}", extra);
    }
}

/// `echo.ping` replies with its request payload
pub fn echo_service() -> ServiceDescriptor {
    ServiceDescriptor::new("echo").method("ping", |_ctx, payload, reply: Reply| async move {
        reply.send(payload);
        Ok(())
    })
}

/// A storage-backed service shaped like a typical user directory
pub fn user_service() -> ServiceDescriptor {
    ServiceDescriptor::new("user-service")
        .method("addUser", |ctx, payload, reply: Reply| async move {
            let id = ctx.storage()?.put(payload).await?;
            reply.send(serde_json::json!({"id": id}));
            Ok(())
        })
        .method("findUser", |ctx, payload, reply: Reply| async move {
            let filter = if payload.is_null() { None } else { Some(&payload) };
            let found = ctx.storage()?.find(filter).await?;
            reply.send(Value::Array(found));
            Ok(())
        })
        .method("updateUser", |ctx, payload, reply: Reply| async move {
            let result = ctx.storage()?.update(payload).await;
            reply.send(serde_json::json!({"ok": result.is_ok()}));
            result
        })
        .method("removeUser", |ctx, payload, reply: Reply| async move {
            let id = payload.as_str().unwrap_or_default().to_string();
            ctx.storage()?.del(&id).await?;
            reply.send(serde_json::json!({"ok": true}));
            Ok(())
        })
}
