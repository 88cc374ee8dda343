//! Stream client: construction, publishing and introspection
//!
//! Consuming lives in `consumer.rs`, acknowledgement and the retry policy in
//! `retry.rs`, retention in `retention.rs`; all are methods on [`StreamClient`].

use crate::streams::config::{StorageBackend, StreamsConfig};
use crate::streams::error::{StreamError, StreamResult};
use crate::streams::events::EventPayload;
use crate::streams::memory_store::InMemoryStreamStore;
use crate::streams::message::{Priority, StreamMessage};
use crate::streams::metrics::{init_stream_metrics, MetricType, MetricsSink, STREAM_METRICS};
use crate::streams::redis_store::RedisStreamStore;
use crate::streams::registry::StreamRegistry;
use crate::streams::store::{PendingEntry, StreamInfo, StreamStore};
use crate::streams::topology::{TopologyManager, TopologyReport};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Reliable event-streaming client.
///
/// Cheap to clone; clones share the store connection, the consumer-group map
/// and the closed flag. Owned and passed around by the caller.
#[derive(Clone)]
pub struct StreamClient {
    pub(crate) store: Arc<dyn StreamStore>,
    pub(crate) registry: Arc<StreamRegistry>,
    pub(crate) topology: TopologyManager,
    pub(crate) metrics: MetricsSink,
    pub(crate) config: StreamsConfig,
    closed: Arc<AtomicBool>,
}

impl StreamClient {
    /// Connect to the configured store and provision the topology.
    ///
    /// Fails when the store cannot be reached.
    pub async fn connect(config: StreamsConfig) -> StreamResult<Self> {
        let store: Arc<dyn StreamStore> = match config.storage {
            StorageBackend::Redis => {
                info!(url = %config.redis_url, "Connecting to Redis stream store");
                Arc::new(
                    RedisStreamStore::new(&config.redis_url, config.redis_password.as_deref())
                        .await?,
                )
            }
            StorageBackend::Memory => {
                info!("Using in-memory stream store");
                Arc::new(InMemoryStreamStore::new())
            }
        };

        let client = Self::with_store(store, config);
        client.initialize().await?;
        Ok(client)
    }

    /// Build a client around an existing store; call [`initialize`](Self::initialize) next
    pub fn with_store(store: Arc<dyn StreamStore>, config: StreamsConfig) -> Self {
        if config.enable_metrics {
            init_stream_metrics();
        }

        let registry = Arc::new(StreamRegistry::new(config.namespace.clone()));
        let topology = TopologyManager::new(store.clone(), registry.clone());
        let metrics = MetricsSink::new(
            store.clone(),
            registry.metrics_stream(),
            config.metrics_max_len,
            config.enable_metrics,
        );

        Self {
            store,
            registry,
            topology,
            metrics,
            config,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Provision streams and consumer groups; idempotent
    pub async fn initialize(&self) -> StreamResult<TopologyReport> {
        self.topology.initialize().await
    }

    /// Publish a new event and return its entry id
    #[allow(clippy::too_many_arguments)]
    pub async fn publish(
        &self,
        stream: &str,
        event_type: &str,
        service: &str,
        data: serde_json::Value,
        priority: Priority,
        user_id: Option<&str>,
        correlation_id: Option<&str>,
    ) -> StreamResult<String> {
        let mut message = StreamMessage::new(stream, event_type, service, data)
            .with_priority(priority)
            .with_max_retries(self.config.default_max_retries);
        if let Some(user_id) = user_id {
            message = message.with_user_id(user_id);
        }
        if let Some(correlation_id) = correlation_id {
            message = message.with_correlation_id(correlation_id);
        }

        self.publish_message(&mut message).await
    }

    /// Publish a typed event
    pub async fn publish_event<T: EventPayload>(
        &self,
        stream: &str,
        service: &str,
        event: &T,
        priority: Priority,
    ) -> StreamResult<String> {
        let mut message = StreamMessage::from_event(stream, service, event)?
            .with_priority(priority)
            .with_max_retries(self.config.default_max_retries);
        self.publish_message(&mut message).await
    }

    /// Append an envelope to its stream and assign the new id back onto it.
    ///
    /// Append failures are returned to the caller; the metrics record is best-effort.
    pub async fn publish_message(&self, message: &mut StreamMessage) -> StreamResult<String> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }

        let physical = self.registry.physical_name(&message.stream);
        let fields = message.to_fields()?;

        let timer = self.metrics.is_enabled().then(|| {
            STREAM_METRICS
                .publish_latency
                .with_label_values(&[&message.stream])
                .start_timer()
        });

        let id = match self
            .store
            .append(&physical, &fields, Some(self.config.max_len))
            .await
        {
            Ok(id) => {
                if let Some(timer) = timer {
                    timer.observe_duration();
                }
                id
            }
            Err(e) => {
                if let Some(timer) = timer {
                    timer.stop_and_discard();
                }
                if self.metrics.is_enabled() {
                    STREAM_METRICS
                        .publish_failures
                        .with_label_values(&[&message.stream])
                        .inc();
                }
                error!(
                    stream = %message.stream,
                    event_type = %message.event_type,
                    error = %e,
                    "Failed to publish message"
                );
                return Err(match e {
                    StreamError::Command(msg) => StreamError::PublishFailed(msg),
                    other => other,
                });
            }
        };

        message.id = id.clone();
        debug!(
            stream = %message.stream,
            message_id = %id,
            event_type = %message.event_type,
            correlation_id = %message.correlation_id,
            "Published message"
        );

        if self.metrics.is_enabled() {
            STREAM_METRICS
                .messages_published
                .with_label_values(&[&message.stream])
                .inc();
        }
        self.metrics
            .record(
                MetricType::MessagePublished,
                json!({
                    "stream": message.stream,
                    "event_type": message.event_type,
                    "service": message.service,
                    "message_id": id,
                    "correlation_id": message.correlation_id,
                    "priority": message.priority.to_string(),
                }),
            )
            .await;

        Ok(id)
    }

    /// Length, first/last entry and groups of a logical stream
    pub async fn stream_info(&self, stream: &str) -> Option<StreamInfo> {
        let physical = self.registry.physical_name(stream);
        match self.store.info(&physical).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(stream = %stream, error = %e, "Failed to read stream info");
                None
            }
        }
    }

    /// Delivered-but-unacknowledged entries of a stream's group
    pub async fn pending_messages(
        &self,
        stream: &str,
        group: Option<&str>,
        count: usize,
    ) -> Vec<PendingEntry> {
        let physical = self.registry.physical_name(stream);
        let group = group
            .map(str::to_string)
            .unwrap_or_else(|| self.topology.group_for(stream));

        match self.store.pending(&physical, &group, count).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(stream = %stream, group = %group, error = %e, "Failed to read pending entries");
                Vec::new()
            }
        }
    }

    /// Whether the store answers a ping
    pub async fn health_check(&self) -> bool {
        !self.is_closed() && self.store.ping().await.is_ok()
    }

    /// Shut the client down; later publishes fail with [`StreamError::Closed`]
    pub async fn close(&self) -> StreamResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing stream client");
        self.store.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Consumer group serving a logical stream
    pub fn group_for(&self, stream: &str) -> String {
        self.topology.group_for(stream)
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn config(&self) -> &StreamsConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn StreamStore> {
        self.store.clone()
    }

    pub fn topology(&self) -> &TopologyManager {
        &self.topology
    }
}
