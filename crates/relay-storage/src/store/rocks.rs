//! RocksDB store engine
//!
//! Values are stored as JSON bytes under their UTF-8 record identifier

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{BlockBasedOptions, DB, IteratorMode, Options, WriteBatch};
use serde_json::Value;
use tracing::info;

use relay_common::{RelayError, Result};

use super::{BatchWrite, KvStore, WriteOptions};
use crate::options::DbOptions;

/// RocksDB-backed store shared by every service adapter
pub struct RocksStore {
    db: Arc<DB>,
}

impl RocksStore {
    /// Open (or create) the database at `options.path`
    pub fn open(options: &DbOptions) -> Result<Self> {
        Self::open_path(&options.path, options)
    }

    pub fn open_path<P: AsRef<Path>>(path: P, options: &DbOptions) -> Result<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(options.create_if_missing);
        db_opts.set_write_buffer_size(options.write_buffer_size_mb * 1024 * 1024);
        if options.compression {
            db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        // Bloom filter for faster point lookups
        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        db_opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&db_opts, path.as_ref()).map_err(RelayError::store)?;
        info!(path = %path.as_ref().display(), "RocksDB store opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Get a reference to the underlying RocksDB instance
    pub fn db(&self) -> Arc<DB> {
        self.db.clone()
    }

    fn write_opts(options: &WriteOptions) -> rocksdb::WriteOptions {
        let mut opts = rocksdb::WriteOptions::default();
        opts.set_sync(options.sync);
        opts
    }
}

#[async_trait]
impl KvStore for RocksStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.db.get(key.as_bytes()).map_err(RelayError::store)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &Value, options: &WriteOptions) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db
            .put_opt(key.as_bytes(), bytes, &Self::write_opts(options))
            .map_err(RelayError::store)
    }

    async fn delete(&self, key: &str, options: &WriteOptions) -> Result<()> {
        self.db
            .delete_opt(key.as_bytes(), &Self::write_opts(options))
            .map_err(RelayError::store)
    }

    async fn write_batch(&self, writes: Vec<BatchWrite>, options: &WriteOptions) -> Result<()> {
        let mut batch = WriteBatch::default();
        for write in &writes {
            match write {
                BatchWrite::Put { key, value } => {
                    batch.put(key.as_bytes(), serde_json::to_vec(value)?);
                }
                BatchWrite::Delete { key } => batch.delete(key.as_bytes()),
            }
        }
        self.db
            .write_opt(batch, &Self::write_opts(options))
            .map_err(RelayError::store)
    }

    async fn scan(&self, visitor: &mut (dyn FnMut(&str, &Value) + Send)) -> Result<()> {
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, value) = item.map_err(RelayError::store)?;
            let key = String::from_utf8_lossy(&key);
            let value: Value = serde_json::from_slice(&value)?;
            visitor(&key, &value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn open_temp() -> (tempfile::TempDir, RocksStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open_path(dir.path(), &DbOptions::default()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_rocks_store_crud() {
        let (_dir, store) = open_temp();
        let opts = WriteOptions::default();

        store.put("k1", &json!({"name": "a"}), &opts).await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), Some(json!({"name": "a"})));

        store.delete("k1", &opts).await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), None);

        // Deleting an absent key is not an error
        store.delete("k1", &WriteOptions::sync()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rocks_store_batch_and_scan() {
        let (_dir, store) = open_temp();
        store
            .write_batch(
                vec![
                    BatchWrite::Put { key: "b".into(), value: json!({"n": 2}) },
                    BatchWrite::Put { key: "a".into(), value: json!({"n": 1}) },
                    BatchWrite::Delete { key: "zz".into() },
                ],
                &WriteOptions::default(),
            )
            .await
            .unwrap();

        let mut seen = Vec::new();
        store
            .scan(&mut |key: &str, value: &Value| seen.push((key.to_string(), value.clone())))
            .await
            .unwrap();
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), json!({"n": 1})),
                ("b".to_string(), json!({"n": 2})),
            ]
        );
    }

    #[tokio::test]
    async fn test_rocks_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RocksStore::open_path(dir.path(), &DbOptions::default()).unwrap();
            store
                .put("kept", &json!({"v": true}), &WriteOptions::sync())
                .await
                .unwrap();
        }
        let store = RocksStore::open_path(dir.path(), &DbOptions::default()).unwrap();
        assert_eq!(store.get("kept").await.unwrap(), Some(json!({"v": true})));
    }

    #[test]
    fn test_open_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let options = DbOptions {
            create_if_missing: false,
            ..DbOptions::default()
        };
        let result = RocksStore::open_path(dir.path().join("absent"), &options);
        assert!(matches!(result, Err(RelayError::Store(_))));
    }
}
