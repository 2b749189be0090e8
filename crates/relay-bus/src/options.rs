//! Broker connection options

use serde::{Deserialize, Serialize};

/// How payloads are carried on the wire
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// Structured JSON payloads
    #[default]
    Json,
    /// Payloads are plain strings; structured values are sent as their JSON text
    String,
}

/// Options for establishing a broker connection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Server addresses, tried in order
    pub servers: Vec<String>,
    /// Client name reported to the server
    pub name: Option<String>,
    /// Payload encoding mode
    pub encoding: PayloadEncoding,
    /// Whether the client reconnects after losing the link
    pub reconnect: bool,
    /// Maximum reconnect attempts; negative means unlimited
    pub max_reconnect_attempts: i32,
    /// Delay between reconnect attempts in milliseconds
    pub reconnect_time_wait_ms: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            servers: vec!["nats://127.0.0.1:4222".to_string()],
            name: None,
            encoding: PayloadEncoding::Json,
            reconnect: true,
            max_reconnect_attempts: 10,
            reconnect_time_wait_ms: 2000,
        }
    }
}

impl ConnectionOptions {
    pub fn is_json(&self) -> bool {
        self.encoding == PayloadEncoding::Json
    }
}
