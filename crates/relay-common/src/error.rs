//! Error taxonomy for Relay
//!
//! Every layer of the workspace reports failures through `RelayError`:
//! - descriptor and registry errors raised synchronously by the host
//! - storage errors returned from the adapter operations
//! - broker errors surfaced through host events or direct broker calls

/// Application-specific error types
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("invalid service descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("empty _id")]
    MissingIdentifier,

    #[error("record '{0}' not found")]
    NotFound(String),

    #[error("'{0}' is not a function")]
    NotAFunction(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("service '{0}' not exist")]
    UnknownService(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RelayError {
    pub fn store(e: impl std::fmt::Display) -> Self {
        RelayError::Store(e.to_string())
    }

    pub fn invalid_descriptor(reason: impl Into<String>) -> Self {
        RelayError::InvalidDescriptor(reason.into())
    }

    /// Whether the error came from the storage engine rather than the adapter checks
    pub fn is_store_error(&self) -> bool {
        matches!(self, RelayError::Store(_))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
