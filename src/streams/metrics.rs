//! Stream metrics: Prometheus counters and the metrics stream sink

use crate::streams::message::now_secs;
use crate::streams::store::StreamStore;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec,
};
use std::sync::Arc;
use std::time::Duration;
use strum::{AsRefStr, Display};

/// Upper bound on how long a metrics append may hold up the caller
const RECORD_TIMEOUT: Duration = Duration::from_millis(250);

/// Record types written to the metrics stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum MetricType {
    MessagePublished,
    MessageAcknowledged,
    MessageRetried,
    MessageDeadLettered,
    StreamsCleaned,
}

/// Process-level stream metrics
pub struct StreamMetrics {
    /// Messages published counter
    pub messages_published: CounterVec,

    /// Messages handed to consumers
    pub messages_consumed: CounterVec,

    /// Messages acknowledged
    pub messages_acknowledged: CounterVec,

    /// Messages republished for another attempt
    pub messages_retried: CounterVec,

    /// Messages moved to the dead-letter stream
    pub messages_dead_lettered: CounterVec,

    /// Failed appends
    pub publish_failures: CounterVec,

    /// Failed group reads
    pub read_errors: CounterVec,

    /// Entries that could not be decoded
    pub decode_failures: CounterVec,

    /// Entries removed by retention
    pub entries_trimmed: CounterVec,

    /// Append latency
    pub publish_latency: HistogramVec,
}

lazy_static! {
    pub static ref STREAM_METRICS: StreamMetrics = StreamMetrics {
        messages_published: register_counter_vec!(
            "event_bus_messages_published_total",
            "Total number of messages published",
            &["stream"]
        )
        .unwrap(),

        messages_consumed: register_counter_vec!(
            "event_bus_messages_consumed_total",
            "Total number of messages returned to consumers",
            &["stream"]
        )
        .unwrap(),

        messages_acknowledged: register_counter_vec!(
            "event_bus_messages_acknowledged_total",
            "Total number of messages acknowledged",
            &["stream"]
        )
        .unwrap(),

        messages_retried: register_counter_vec!(
            "event_bus_messages_retried_total",
            "Total number of messages republished for retry",
            &["stream"]
        )
        .unwrap(),

        messages_dead_lettered: register_counter_vec!(
            "event_bus_messages_dead_lettered_total",
            "Total number of messages moved to the dead-letter stream",
            &["stream"]
        )
        .unwrap(),

        publish_failures: register_counter_vec!(
            "event_bus_publish_failures_total",
            "Total number of failed appends",
            &["stream"]
        )
        .unwrap(),

        read_errors: register_counter_vec!(
            "event_bus_read_errors_total",
            "Total number of failed group reads",
            &["stream"]
        )
        .unwrap(),

        decode_failures: register_counter_vec!(
            "event_bus_decode_failures_total",
            "Total number of entries that could not be decoded",
            &["stream"]
        )
        .unwrap(),

        entries_trimmed: register_counter_vec!(
            "event_bus_entries_trimmed_total",
            "Total number of entries removed by retention",
            &["stream"]
        )
        .unwrap(),

        publish_latency: register_histogram_vec!(
            "event_bus_publish_latency_seconds",
            "Append latency in seconds",
            &["stream"]
        )
        .unwrap(),
    };
}

/// Initialize stream metrics
pub fn init_stream_metrics() {
    lazy_static::initialize(&STREAM_METRICS);
}

/// Render every registered metric in the Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

/// Best-effort writer for the reserved metrics stream.
///
/// Every failure is swallowed and logged at debug level.
#[derive(Clone)]
pub struct MetricsSink {
    store: Arc<dyn StreamStore>,
    stream: String,
    max_len: usize,
    enabled: bool,
}

impl MetricsSink {
    pub fn new(store: Arc<dyn StreamStore>, stream: impl Into<String>, max_len: usize, enabled: bool) -> Self {
        Self {
            store,
            stream: stream.into(),
            max_len,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append `{metric_type, timestamp, data}` to the metrics stream
    pub async fn record(&self, metric_type: MetricType, data: serde_json::Value) {
        if !self.enabled {
            return;
        }

        let data = match serde_json::to_string(&data) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(metric_type = %metric_type, error = %e, "Failed to encode metric");
                return;
            }
        };
        let fields = vec![
            ("metric_type".to_string(), metric_type.to_string()),
            ("timestamp".to_string(), now_secs().to_string()),
            ("data".to_string(), data),
        ];

        match tokio::time::timeout(
            RECORD_TIMEOUT,
            self.store.append(&self.stream, &fields, Some(self.max_len)),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::debug!(metric_type = %metric_type, error = %e, "Failed to record metric");
            }
            Err(_) => {
                tracing::debug!(metric_type = %metric_type, "Timed out recording metric");
            }
        }
    }
}
