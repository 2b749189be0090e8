//! Wire-level types exchanged with the broker

use std::time::Duration;

use serde_json::Value;

/// Identifier of one installed subscription; revocable individually
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sid-{}", self.0)
    }
}

/// A message delivered to a subscription handler
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Subject the message was published on
    pub subject: String,
    /// Decoded payload
    pub payload: Value,
    /// Reply address, present when the publisher expects a response
    pub reply: Option<String>,
}

impl Message {
    pub fn new(subject: impl Into<String>, payload: Value) -> Self {
        Self {
            subject: subject.into(),
            payload,
            reply: None,
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }
}

/// Connection lifecycle signal emitted by the broker client
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Initial connection established
    Connect,
    /// Asynchronous connection error, not tied to a pending call
    Error(String),
    /// Link to the server lost
    Disconnect,
    /// Client is attempting to reconnect
    Reconnecting,
    /// Link re-established after a disconnect
    Reconnect,
}

impl std::fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionEvent::Connect => write!(f, "connect"),
            ConnectionEvent::Error(_) => write!(f, "error"),
            ConnectionEvent::Disconnect => write!(f, "disconnect"),
            ConnectionEvent::Reconnecting => write!(f, "reconnecting"),
            ConnectionEvent::Reconnect => write!(f, "reconnect"),
        }
    }
}

/// Broker-level request options, passed through verbatim by the service layer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Expected reply count; the reply inbox unsubscribes after this many messages
    pub max: Option<usize>,
    /// Give up waiting for the first reply after this long
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn max(max: usize) -> Self {
        Self {
            max: Some(max),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
