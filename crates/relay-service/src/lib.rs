//! Relay Service - declarative services on a message bus
//!
//! This crate provides:
//! - Service descriptors (hooks, methods, local functions, initial state)
//! - The per-service runtime context
//! - The subscription router mapping `{service}.{method}` onto handlers
//! - `ServiceHost`, the registry and lifecycle controller
//! - Configuration loading

pub mod config;
pub mod context;
pub mod descriptor;
pub mod event;
pub mod host;
mod registry;
pub mod router;

pub use config::RelayConfig;
pub use context::{LocalFunction, ServiceContext};
pub use descriptor::{DataInitializer, Hook, MethodHandler, ServiceDescriptor};
pub use event::HostEvent;
pub use host::ServiceHost;
pub use router::{Reply, SubscriptionRecord};

// Re-exported so services only need this crate
pub use relay_bus::{
    Connection, ConnectionOptions, Connector, LocalBroker, Message, RequestOptions, handler_fn,
};
pub use relay_common::{RelayError, Result};
pub use relay_storage::{
    BatchOperation, BatchType, DbOptions, Storage, StoreEngine, ValueEncoding, WriteOptions,
};
