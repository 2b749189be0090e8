//! Broker error types

use relay_common::RelayError;

/// Error type for broker operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("connection closed")]
    Closed,

    #[error("connection not ready")]
    NotConnected,

    #[error("invalid subject: '{0}'")]
    InvalidSubject(String),

    #[error("no responders for '{0}'")]
    NoResponders(String),

    #[error("request timeout")]
    Timeout,

    #[error("unknown subscription: {0}")]
    UnknownSubscription(u64),
}

impl From<BusError> for RelayError {
    fn from(e: BusError) -> Self {
        RelayError::Broker(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(BusError::Closed.to_string(), "connection closed");
        assert_eq!(
            BusError::NoResponders("echo.ping".to_string()).to_string(),
            "no responders for 'echo.ping'"
        );
    }

    #[test]
    fn test_into_relay_error() {
        let err: RelayError = BusError::Timeout.into();
        assert_eq!(err, RelayError::Broker("request timeout".to_string()));
    }
}
