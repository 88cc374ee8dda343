//! Reliable event streaming over an append-only log store
//!
//! Services publish typed events into named logical streams; workers in
//! consumer groups read them with at-least-once delivery, acknowledge what
//! they processed, and hand failures to a bounded retry policy that ends in a
//! dead-letter stream.
//!
//! # Features
//!
//! - **Consumer Groups**: Each entry is delivered to one consumer of a group
//! - **Retry Policy**: Failed messages are republished with an incremented retry count
//! - **Dead Letter Stream**: Exhausted messages are kept with their failure reason
//! - **Self-Healing Topology**: Missing groups are recreated on the next read
//! - **Retention**: Time-based trimming of old entries
//! - **Metrics Integration**: Prometheus counters plus a best-effort metrics stream
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │               StreamClient                       │
//! ├─────────────────────────────────────────────────┤
//! │  - publish()      - consume()                    │
//! │  - acknowledge()  - retry()                      │
//! │  - cleanup()      - stream_info()                │
//! └─────────────────────────────────────────────────┘
//!           │                        │
//!           ▼                        ▼
//! ┌──────────────────┐    ┌──────────────────┐
//! │ TopologyManager  │    │   MetricsSink    │
//! └──────────────────┘    └──────────────────┘
//!           │                        │
//!           ▼                        ▼
//! ┌─────────────────────────────────────────────────┐
//! │            StreamStore trait                     │
//! ├────────────────────────┬────────────────────────┤
//! │   RedisStreamStore     │  InMemoryStreamStore   │
//! └────────────────────────┴────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use automation_event_bus::streams::{Priority, StreamClient, StreamsConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = StreamClient::connect(StreamsConfig::default()).await?;
//!
//!     client
//!         .publish("assets", "asset.discovered", "asset-service", json!({"host": "10.0.0.5"}), Priority::High, None, None)
//!         .await?;
//!
//!     for message in client.consume(&["assets"], "worker-1", 10, 1000).await {
//!         client.acknowledge_message(&message).await;
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod consumer;
mod error;
mod events;
mod memory_store;
mod message;
mod metrics;
mod processor;
mod redis_store;
mod registry;
mod retention;
mod retry;
mod store;
mod topology;

pub use client::StreamClient;
pub use config::{StorageBackend, StreamsConfig};
pub use error::{StreamError, StreamResult};
pub use events::{
    AiTaskCompleted, AssetDiscovered, AssetUpdated, AutomationJobCompleted,
    AutomationJobStarted, EventPayload, NetworkScanCompleted, PlatformEvent, SystemNotification,
    UserCreated,
};
pub use memory_store::InMemoryStreamStore;
pub use message::{
    is_marker, now_secs, DeadLetterRecord, Priority, StreamMessage, DEAD_LETTER_STATUS,
    DEFAULT_MAX_RETRIES, MARKER_FIELD,
};
pub use metrics::{
    gather_metrics, init_stream_metrics, MetricType, MetricsSink, StreamMetrics, STREAM_METRICS,
};
pub use processor::{BatchStats, Disposition, HandlerError, MessageHandler, StreamProcessor};
pub use redis_store::RedisStreamStore;
pub use registry::{LogicalStream, StreamRegistry, DEAD_LETTER_STREAM, METRICS_STREAM};
pub use retention::{cutoff_id, CleanupReport, RetentionSweeper};
pub use retry::{RetryOutcome, MAX_RETRIES_EXCEEDED};
pub use store::{
    EntryFields, EntryId, GroupCreation, GroupInfo, GroupRead, PendingEntry, StreamEntry,
    StreamInfo, StreamStore,
};
pub use topology::{Provisioning, TopologyManager, TopologyReport, GROUP_START_ID};
