//! Stream client configuration

use serde::{Deserialize, Serialize};

/// Log store backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Redis Streams
    #[default]
    Redis,
    /// In-process store (tests, local development)
    Memory,
}

/// Main stream client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamsConfig {
    /// Backend to use
    #[serde(default)]
    pub storage: StorageBackend,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Optional Redis password, applied on top of the URL
    #[serde(default)]
    pub redis_password: Option<String>,

    /// Prefix of every physical stream name
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Approximate cap for event streams
    #[serde(default = "default_max_len")]
    pub max_len: usize,

    /// Approximate cap for the metrics stream
    #[serde(default = "default_metrics_max_len")]
    pub metrics_max_len: usize,

    /// Retry budget given to new messages
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Entries requested per stream per read
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How long a group read waits for new entries
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,

    /// Consumer identity used by the processor loop
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    /// Emit records to the metrics stream and Prometheus
    #[serde(default = "default_true")]
    pub enable_metrics: bool,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            redis_url: default_redis_url(),
            redis_password: None,
            namespace: default_namespace(),
            max_len: default_max_len(),
            metrics_max_len: default_metrics_max_len(),
            default_max_retries: default_max_retries(),
            batch_size: default_batch_size(),
            block_ms: default_block_ms(),
            consumer_name: default_consumer_name(),
            enable_metrics: true,
        }
    }
}

impl StreamsConfig {
    /// In-memory configuration, mostly for tests
    pub fn in_memory() -> Self {
        Self {
            storage: StorageBackend::Memory,
            ..Default::default()
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_namespace() -> String {
    "automation".to_string()
}

fn default_max_len() -> usize {
    10_000
}

fn default_metrics_max_len() -> usize {
    50_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_batch_size() -> usize {
    10
}

fn default_block_ms() -> u64 {
    1000
}

fn default_consumer_name() -> String {
    "event-bus-worker".to_string()
}

fn default_true() -> bool {
    true
}
