//! Host lifecycle events
//!
//! Broker connection signals re-emitted to the host's own observers

use relay_bus::ConnectionEvent;

/// Default capacity of the host event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Signal forwarded from the broker connection, payload unchanged
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    Connect,
    /// Asynchronous broker error
    Err(String),
    Disconnect,
    Reconnecting,
    Reconnect,
}

impl From<ConnectionEvent> for HostEvent {
    fn from(event: ConnectionEvent) -> Self {
        match event {
            ConnectionEvent::Connect => HostEvent::Connect,
            ConnectionEvent::Error(message) => HostEvent::Err(message),
            ConnectionEvent::Disconnect => HostEvent::Disconnect,
            ConnectionEvent::Reconnecting => HostEvent::Reconnecting,
            ConnectionEvent::Reconnect => HostEvent::Reconnect,
        }
    }
}

impl std::fmt::Display for HostEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostEvent::Connect => write!(f, "connect"),
            HostEvent::Err(message) => write!(f, "err: {}", message),
            HostEvent::Disconnect => write!(f, "disconnect"),
            HostEvent::Reconnecting => write!(f, "reconnecting"),
            HostEvent::Reconnect => write!(f, "reconnect"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_unchanged() {
        assert_eq!(HostEvent::from(ConnectionEvent::Connect), HostEvent::Connect);
        assert_eq!(
            HostEvent::from(ConnectionEvent::Error("stale".to_string())),
            HostEvent::Err("stale".to_string())
        );
        assert_eq!(
            HostEvent::from(ConnectionEvent::Reconnecting),
            HostEvent::Reconnecting
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(HostEvent::Disconnect.to_string(), "disconnect");
        assert_eq!(HostEvent::Err("boom".to_string()).to_string(), "err: boom");
    }
}
