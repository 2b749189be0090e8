//! Subscription router
//!
//! Maps `{service}.{method}` subjects onto bound method handlers. Wildcard
//! matching and reply correlation stay with the broker; the router only checks
//! whether an inbound message carries a reply address.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use relay_bus::{Connection, Message, SubscriptionId, handler_fn};
use relay_common::{Result, rpc_subject};

use crate::context::ServiceContext;
use crate::descriptor::MethodHandler;

/// Reply callback handed to every method invocation
///
/// Sending is a no-op when the caller did not ask for a response.
#[derive(Clone)]
pub struct Reply {
    connection: Arc<dyn Connection>,
    address: Option<String>,
}

impl Reply {
    pub fn new(connection: Arc<dyn Connection>, address: Option<String>) -> Self {
        Self {
            connection,
            address,
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn expects_reply(&self) -> bool {
        self.address.is_some()
    }

    /// Publish `payload` to the reply address, if the message carried one
    pub fn send(&self, payload: Value) {
        let Some(address) = &self.address else {
            return;
        };
        if let Err(e) = self.connection.publish(address, payload) {
            warn!(reply = %address, error = %e, "failed to publish reply");
        }
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reply").field("address", &self.address).finish()
    }
}

/// One installed method subscription
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub method: String,
    pub subject: String,
    pub sid: SubscriptionId,
}

/// Subscribe every method of `context`'s service
///
/// On failure the subscriptions installed so far are revoked again.
pub(crate) fn install(
    connection: &Arc<dyn Connection>,
    context: &ServiceContext,
    methods: &[(String, MethodHandler)],
) -> Result<Vec<SubscriptionRecord>> {
    let mut records = Vec::with_capacity(methods.len());

    for (method, handler) in methods {
        let subject = rpc_subject(context.service(), method);
        match subscribe_method(connection, context, method, &subject, handler.clone()) {
            Ok(sid) => records.push(SubscriptionRecord {
                method: method.clone(),
                subject,
                sid,
            }),
            Err(e) => {
                revoke(connection.as_ref(), &records);
                return Err(e);
            }
        }
    }
    Ok(records)
}

/// Unsubscribe every record, logging the ones the broker no longer knows
pub(crate) fn revoke(connection: &dyn Connection, records: &[SubscriptionRecord]) {
    for record in records {
        if let Err(e) = connection.unsubscribe(record.sid) {
            warn!(subject = %record.subject, sid = %record.sid, error = %e, "failed to unsubscribe");
        }
    }
}

fn subscribe_method(
    connection: &Arc<dyn Connection>,
    context: &ServiceContext,
    method: &str,
    subject: &str,
    handler: MethodHandler,
) -> Result<SubscriptionId> {
    let service = context.service().to_string();
    let reply_connection = connection.clone();
    let context = context.clone();
    let method_name = method.to_string();

    let sid = connection.subscribe(
        subject,
        handler_fn(move |msg: Message| {
            let reply = Reply::new(reply_connection.clone(), msg.reply);
            let context = context.clone();
            let handler = handler.clone();
            let method = method_name.clone();
            async move {
                let service = context.service().to_string();
                if let Err(e) = handler(context, msg.payload, reply).await {
                    warn!(%service, %method, error = %e, "method handler failed");
                }
            }
        }),
    )?;
    debug!(%service, %subject, %sid, "method subscribed");
    Ok(sid)
}
