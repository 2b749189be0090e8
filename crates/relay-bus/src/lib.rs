//! Relay Bus - Message broker abstraction
//!
//! This crate provides:
//! - `Connector` / `Connection` traits the service layer talks to
//! - Subject validation and `*` / `>` wildcard matching
//! - `LocalBroker`, an in-process broker with request/reply support
//! - Connection options and lifecycle events

pub mod connection;
pub mod error;
pub mod local;
pub mod model;
pub mod options;
pub mod subject;

pub use connection::{Connection, Connector, MessageHandler, handler_fn};
pub use error::BusError;
pub use local::{LocalBroker, LocalConnection};
pub use model::{ConnectionEvent, Message, RequestOptions, SubscriptionId};
pub use options::{ConnectionOptions, PayloadEncoding};
