//! Relay Storage - service-scoped persistence
//!
//! This crate provides:
//! - The key/value store abstraction with RocksDB and in-memory engines
//! - Record filters for `find`
//! - The per-service adapter that publishes a change event for every mutation

pub mod adapter;
pub mod filter;
pub mod options;
pub mod store;

use std::sync::Arc;

use tracing::info;

use relay_common::Result;

pub use adapter::{BatchOperation, BatchType, ChangeOperation, Storage};
pub use filter::Filter;
pub use options::{DbOptions, StoreEngine, ValueEncoding};
pub use store::{BatchWrite, KvStore, MemoryStore, RocksStore, WriteOptions};

/// Open the store engine selected by `options`
pub fn open_store(options: &DbOptions) -> Result<Arc<dyn KvStore>> {
    match options.engine {
        StoreEngine::Rocksdb => {
            let store = RocksStore::open(options)?;
            info!(path = %options.path.display(), "rocksdb store opened");
            Ok(Arc::new(store))
        }
        StoreEngine::Memory => {
            info!("in-memory store opened");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
