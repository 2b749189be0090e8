//! In-memory store engine
//!
//! Keeps entries in key order like the on-disk engine, which keeps scan order
//! identical between the two.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use relay_common::{RelayError, Result};

use super::{BatchWrite, KvStore, WriteOptions};

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
    /// Accepted write calls (put, delete, batch)
    writes: AtomicU64,
    read_only: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write calls the store accepted
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Reject every write with a store error, e.g. to emulate a full disk
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(RelayError::store("store is read-only"));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &Value, _options: &WriteOptions) -> Result<()> {
        self.check_writable()?;
        self.entries.write().insert(key.to_string(), value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str, _options: &WriteOptions) -> Result<()> {
        self.check_writable()?;
        self.entries.write().remove(key);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn write_batch(&self, writes: Vec<BatchWrite>, _options: &WriteOptions) -> Result<()> {
        self.check_writable()?;
        let mut entries = self.entries.write();
        for write in writes {
            match write {
                BatchWrite::Put { key, value } => {
                    entries.insert(key, value);
                }
                BatchWrite::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn scan(&self, visitor: &mut (dyn FnMut(&str, &Value) + Send)) -> Result<()> {
        let entries = self.entries.read();
        for (key, value) in entries.iter() {
            visitor(key, value);
        }
        Ok(())
    }
}
