//! Store configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which engine backs the shared store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreEngine {
    #[default]
    Rocksdb,
    Memory,
}

/// How record values are encoded on disk
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueEncoding {
    #[default]
    Json,
}

/// Options for opening the embedded store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbOptions {
    /// Database directory
    pub path: PathBuf,
    pub engine: StoreEngine,
    pub value_encoding: ValueEncoding,
    pub create_if_missing: bool,
    /// Lz4 block compression
    pub compression: bool,
    pub write_buffer_size_mb: usize,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./db"),
            engine: StoreEngine::Rocksdb,
            value_encoding: ValueEncoding::Json,
            create_if_missing: true,
            compression: true,
            write_buffer_size_mb: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_db_options() {
        let opts = DbOptions::default();
        assert_eq!(opts.path, PathBuf::from("./db"));
        assert_eq!(opts.engine, StoreEngine::Rocksdb);
        assert!(opts.create_if_missing);
    }

    #[test]
    fn test_deserialize_engine() {
        let opts: DbOptions = serde_json::from_str(r#"{"engine":"memory"}"#).unwrap();
        assert_eq!(opts.engine, StoreEngine::Memory);
        assert_eq!(opts.write_buffer_size_mb, 64);
    }

    #[test]
    fn test_value_encoding_is_json_only() {
        let opts: DbOptions = serde_json::from_str(r#"{"value_encoding":"json"}"#).unwrap();
        assert_eq!(opts.value_encoding, ValueEncoding::Json);
        assert_eq!(DbOptions::default().value_encoding, ValueEncoding::Json);
        assert!(serde_json::from_str::<DbOptions>(r#"{"value_encoding":"msgpack"}"#).is_err());
    }
}
