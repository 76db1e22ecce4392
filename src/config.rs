//! sluice configuration from sluice.toml

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SluiceError;

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct SluiceConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

/// Source store connection: where the continuous changes feed lives.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConnectionConfig {
    #[serde(default = "default_couch_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Disable TLS hostname verification.
    #[serde(default)]
    pub no_verify: bool,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    /// Socket read timeout; defaults to 3x the heartbeat interval.
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
}

fn default_couch_url() -> String {
    "http://localhost:5984".to_string()
}
fn default_heartbeat_ms() -> u64 {
    10_000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_couch_url(),
            username: None,
            password: None,
            no_verify: false,
            heartbeat_ms: default_heartbeat_ms(),
            read_timeout_ms: None,
        }
    }
}

impl ConnectionConfig {
    pub fn read_timeout_ms(&self) -> u64 {
        self.read_timeout_ms.unwrap_or(self.heartbeat_ms * 3)
    }
}

/// Which database to tail, and how to shape its changes.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database")]
    pub database: String,
    /// Server-side changes filter name, e.g. "app/important".
    #[serde(default)]
    pub filter: Option<String>,
    /// Extra URL parameters passed to the filter. BTreeMap keeps the
    /// rendered URL stable across rebuilds.
    #[serde(default)]
    pub filter_params: BTreeMap<String, String>,
    /// Strip `_attachments` payloads from indexed documents.
    #[serde(default = "default_true")]
    pub ignore_attachments: bool,
}

fn default_database() -> String {
    "db".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            filter: None,
            filter_params: BTreeMap::new(),
            ignore_attachments: default_true(),
        }
    }
}

/// Sink indexing: destination, batching thresholds, backpressure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_sink_url")]
    pub sink_url: String,
    /// Destination index name; defaults to the database name.
    #[serde(default)]
    pub name: Option<String>,
    /// Destination mapping type; defaults to the database name.
    #[serde(default, rename = "type")]
    pub doc_type: Option<String>,
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,
    /// Linger interval while collecting a batch.
    #[serde(default = "default_bulk_timeout_ms")]
    pub bulk_timeout_ms: u64,
    /// Hand-off queue capacity; zero or negative means unbounded.
    #[serde(default = "default_throttle_size")]
    pub throttle_size: i64,
    #[serde(default = "default_checkpoint_index")]
    pub checkpoint_index: String,
}

fn default_sink_url() -> String {
    "http://localhost:9200".to_string()
}
fn default_bulk_size() -> usize {
    100
}
fn default_bulk_timeout_ms() -> u64 {
    10
}
fn default_throttle_size() -> i64 {
    5 * default_bulk_size() as i64
}
fn default_checkpoint_index() -> String {
    "cdc-checkpoints".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            sink_url: default_sink_url(),
            name: None,
            doc_type: None,
            bulk_size: default_bulk_size(),
            bulk_timeout_ms: default_bulk_timeout_ms(),
            throttle_size: default_throttle_size(),
            checkpoint_index: default_checkpoint_index(),
        }
    }
}

/// Load configuration from a toml file. A missing file yields the defaults;
/// a file that exists but does not parse is an error.
pub fn load_config(path: &Path) -> Result<SluiceConfig, SluiceError> {
    if !path.exists() {
        tracing::info!("Config: {:?} not found, using defaults", path);
        return Ok(SluiceConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| SluiceError::Config(format!("failed to read {:?}: {}", path, e)))?;
    toml::from_str(&content)
        .map_err(|e| SluiceError::Config(format!("failed to parse {:?}: {}", path, e)))
}
