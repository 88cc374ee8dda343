//! Consumer-group reads

use crate::streams::client::StreamClient;
use crate::streams::message::{is_marker, StreamMessage};
use crate::streams::metrics::STREAM_METRICS;
use crate::streams::store::{GroupRead, StreamEntry};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

impl StreamClient {
    /// Read new messages for `consumer` from each logical stream in turn.
    ///
    /// The whole call waits at most `block_ms`: each read blocks only for the
    /// time left before that deadline, and once a batch has been collected the
    /// remaining streams are polled without blocking. Every returned message
    /// carries the logical stream it was read from, so acknowledging it
    /// targets that stream's group. A `block_ms` of 0 polls without waiting.
    ///
    /// Read errors are logged and yield nothing for that stream, and a missing
    /// group is recreated so the next call succeeds. Entries that fail to
    /// decode are skipped and stay pending.
    pub async fn consume<S: AsRef<str>>(
        &self,
        streams: &[S],
        consumer: &str,
        batch_size: usize,
        block_ms: u64,
    ) -> Vec<StreamMessage> {
        let mut messages = Vec::new();
        if self.is_closed() {
            return messages;
        }

        let deadline = Instant::now() + Duration::from_millis(block_ms);

        for stream in streams {
            let logical = stream.as_ref();
            let physical = self.registry.physical_name(logical);
            let group = self.topology.group_for(logical);
            let block = if messages.is_empty() {
                remaining_ms(deadline)
            } else {
                None
            };

            match self
                .store
                .read_group(&physical, &group, consumer, batch_size, block)
                .await
            {
                Ok(GroupRead::Entries(entries)) => {
                    let decoded = self.decode_entries(logical, &physical, &group, entries).await;
                    messages.extend(decoded);
                }
                Ok(GroupRead::NoGroup) => {
                    warn!(stream = %logical, group = %group, "Consumer group missing, recreating");
                    self.recover_groups(logical).await;
                }
                Err(e) => {
                    if self.metrics.is_enabled() {
                        STREAM_METRICS.read_errors.with_label_values(&[logical]).inc();
                    }
                    error!(stream = %logical, group = %group, error = %e, "Failed to read from stream");
                }
            }
        }

        messages
    }

    async fn decode_entries(
        &self,
        logical: &str,
        physical: &str,
        group: &str,
        entries: Vec<StreamEntry>,
    ) -> Vec<StreamMessage> {
        let mut messages = Vec::with_capacity(entries.len());
        let mut markers = Vec::new();

        for entry in entries {
            if is_marker(&entry.fields) {
                markers.push(entry.id);
                continue;
            }

            match StreamMessage::from_fields(&entry.id, &entry.fields) {
                Ok(mut message) => {
                    // dead-letter records keep the original stream on the wire
                    message.stream = logical.to_string();
                    messages.push(message);
                }
                Err(e) => {
                    if self.metrics.is_enabled() {
                        STREAM_METRICS.decode_failures.with_label_values(&[logical]).inc();
                    }
                    warn!(stream = %logical, message_id = %entry.id, error = %e, "Skipping undecodable entry");
                }
            }
        }

        if !markers.is_empty() {
            if let Err(e) = self.store.ack(physical, group, &markers).await {
                debug!(stream = %logical, error = %e, "Failed to acknowledge marker entries");
            }
        }

        if self.metrics.is_enabled() && !messages.is_empty() {
            STREAM_METRICS
                .messages_consumed
                .with_label_values(&[logical])
                .inc_by(messages.len() as f64);
        }
        messages
    }

    /// Recreate every provisioned group, plus the group of `logical` when it
    /// is not a registered stream.
    async fn recover_groups(&self, logical: &str) {
        let outcomes = self.topology.ensure_groups().await;
        if !outcomes.contains_key(logical) {
            self.topology.ensure_group(logical).await;
        }
    }
}

/// Whole milliseconds left before `deadline`; `None` once it has passed, since
/// a zero block would wait forever on Redis
fn remaining_ms(deadline: Instant) -> Option<u64> {
    let remaining = deadline.saturating_duration_since(Instant::now()).as_millis() as u64;
    (remaining > 0).then_some(remaining)
}
