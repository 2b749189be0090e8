//! Configuration loading
//!
//! Sources, lowest precedence first: built-in defaults, an optional YAML file
//! (`conf/relay.yml` unless told otherwise), then `RELAY__`-prefixed environment
//! variables such as `RELAY__DB__PATH` or `RELAY__CONNECTION__SERVERS`.

use std::collections::HashMap;
use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use relay_bus::ConnectionOptions;
use relay_common::{RelayError, Result};
use relay_storage::DbOptions;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "conf/relay.yml";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "RELAY";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub connection: ConnectionOptions,
    pub db: DbOptions,
}

impl RelayConfig {
    /// Load from `path` (or the default file when absent) and the process
    /// environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`RelayConfig::load`], reading overrides from `env` instead of the
    /// process environment when given
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (File::from(path), true),
            None => (File::with_name(DEFAULT_CONFIG_FILE), false),
        };

        let config = Config::builder()
            .add_source(file.required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("connection.servers")
                    .source(env),
            )
            .build()
            .map_err(|e| RelayError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| RelayError::Config(e.to_string()))
    }
}
