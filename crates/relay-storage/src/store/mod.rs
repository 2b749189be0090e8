//! Embedded key/value store abstraction
//!
//! One store instance is shared by every service adapter. Keys are record
//! identifiers; values are JSON documents.

pub mod memory;
pub mod rocks;

use async_trait::async_trait;
use serde_json::Value;

use relay_common::Result;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

/// Per-write options forwarded to the engine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Flush the write-ahead log before returning
    pub sync: bool,
}

impl WriteOptions {
    pub fn sync() -> Self {
        Self { sync: true }
    }
}

/// One entry of an atomic multi-write
#[derive(Clone, Debug, PartialEq)]
pub enum BatchWrite {
    Put { key: String, value: Value },
    Delete { key: String },
}

impl BatchWrite {
    pub fn key(&self) -> &str {
        match self {
            BatchWrite::Put { key, .. } | BatchWrite::Delete { key } => key,
        }
    }
}

/// Embedded key/value engine
///
/// Each call is atomic on its own; there are no cross-call transactions.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read one key; `None` when absent
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn put(&self, key: &str, value: &Value, options: &WriteOptions) -> Result<()>;

    /// Delete one key; deleting an absent key succeeds
    async fn delete(&self, key: &str, options: &WriteOptions) -> Result<()>;

    /// Apply all writes atomically
    async fn write_batch(&self, writes: Vec<BatchWrite>, options: &WriteOptions) -> Result<()>;

    /// Walk every entry once in engine order
    async fn scan(&self, visitor: &mut (dyn FnMut(&str, &Value) + Send)) -> Result<()>;
}
