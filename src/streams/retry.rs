//! Acknowledgement, retry and dead-lettering

use crate::streams::client::StreamClient;
use crate::streams::error::StreamResult;
use crate::streams::message::{now_secs, DeadLetterRecord, StreamMessage};
use crate::streams::metrics::{MetricType, STREAM_METRICS};
use serde_json::json;
use tracing::{error, info, warn};

/// Failure reason recorded when the retry budget is spent
pub const MAX_RETRIES_EXCEEDED: &str = "max retries exceeded";

/// What [`StreamClient::retry_message`] did with a failed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// A successor entry was appended to the same stream
    Republished(String),
    /// The message was written to the dead-letter stream
    DeadLettered(String),
    /// Neither append succeeded; the original entry is all that is left
    Failed,
}

impl RetryOutcome {
    /// Whether a durable successor of the message exists, so the original
    /// entry may be acknowledged
    pub fn is_settled(&self) -> bool {
        !matches!(self, RetryOutcome::Failed)
    }
}

impl StreamClient {
    /// Acknowledge one entry of a group; re-acknowledging is harmless
    pub async fn acknowledge(&self, stream: &str, group: &str, message_id: &str) -> bool {
        if self.is_closed() {
            return false;
        }

        let physical = self.registry.physical_name(stream);
        match self
            .store
            .ack(&physical, group, &[message_id.to_string()])
            .await
        {
            Ok(acknowledged) => {
                if self.metrics.is_enabled() {
                    STREAM_METRICS
                        .messages_acknowledged
                        .with_label_values(&[stream])
                        .inc_by(acknowledged as f64);
                }
                self.metrics
                    .record(
                        MetricType::MessageAcknowledged,
                        json!({
                            "stream": stream,
                            "group": group,
                            "message_id": message_id,
                        }),
                    )
                    .await;
                true
            }
            Err(e) => {
                warn!(stream = %stream, group = %group, message_id = %message_id, error = %e, "Failed to acknowledge message");
                false
            }
        }
    }

    /// Acknowledge a consumed message in its stream's group
    pub async fn acknowledge_message(&self, message: &StreamMessage) -> bool {
        let group = self.topology.group_for(&message.stream);
        self.acknowledge(&message.stream, &group, &message.id).await
    }

    /// Retry a failed message or move it to the dead-letter stream.
    ///
    /// Returns `true` only when the message was republished, in which case
    /// `message` now describes the successor. The original entry is left
    /// pending either way.
    pub async fn retry(&self, message: &mut StreamMessage) -> bool {
        matches!(self.retry_message(message).await, RetryOutcome::Republished(_))
    }

    /// Same as [`retry`](Self::retry) with the full outcome
    pub async fn retry_message(&self, message: &mut StreamMessage) -> RetryOutcome {
        if self.is_closed() {
            error!(
                stream = %message.stream,
                message_id = %message.id,
                "Client closed; message left pending"
            );
            return RetryOutcome::Failed;
        }

        let reason = if message.is_retryable() {
            let original_id = message.id.clone();
            let mut successor = message.clone();
            successor.id.clear();
            successor.retry_count += 1;
            successor.timestamp = now_secs();

            match self.publish_message(&mut successor).await {
                Ok(new_id) => {
                    if self.metrics.is_enabled() {
                        STREAM_METRICS
                            .messages_retried
                            .with_label_values(&[&message.stream])
                            .inc();
                    }
                    info!(
                        stream = %message.stream,
                        original_id = %original_id,
                        message_id = %new_id,
                        retry_count = successor.retry_count,
                        max_retries = successor.max_retries,
                        "Message scheduled for retry"
                    );
                    self.metrics
                        .record(
                            MetricType::MessageRetried,
                            json!({
                                "stream": message.stream,
                                "original_id": original_id,
                                "message_id": new_id,
                                "retry_count": successor.retry_count,
                                "correlation_id": message.correlation_id,
                            }),
                        )
                        .await;

                    *message = successor;
                    return RetryOutcome::Republished(new_id);
                }
                Err(e) => {
                    warn!(
                        stream = %message.stream,
                        message_id = %original_id,
                        error = %e,
                        "Retry republish failed, dead-lettering"
                    );
                    format!("retry failed: {}", e)
                }
            }
        } else {
            MAX_RETRIES_EXCEEDED.to_string()
        };

        match self.dead_letter(message, &reason).await {
            Ok(id) => RetryOutcome::DeadLettered(id),
            Err(e) => {
                error!(
                    stream = %message.stream,
                    message_id = %message.id,
                    error = %e,
                    "Failed to dead-letter message; left pending"
                );
                RetryOutcome::Failed
            }
        }
    }

    /// Append a terminal record for `message` to the dead-letter stream
    pub async fn dead_letter(&self, message: &StreamMessage, reason: &str) -> StreamResult<String> {
        let record = DeadLetterRecord::new(message.clone(), reason);
        let fields = record.to_fields()?;
        let id = self
            .store
            .append(
                self.registry.dead_letter_stream(),
                &fields,
                Some(self.config.max_len),
            )
            .await?;

        if self.metrics.is_enabled() {
            STREAM_METRICS
                .messages_dead_lettered
                .with_label_values(&[&message.stream])
                .inc();
        }
        error!(
            stream = %message.stream,
            message_id = %message.id,
            dead_letter_id = %id,
            retry_count = message.retry_count,
            reason = %reason,
            "Message moved to dead-letter stream"
        );
        self.metrics
            .record(
                MetricType::MessageDeadLettered,
                json!({
                    "stream": message.stream,
                    "message_id": message.id,
                    "dead_letter_id": id,
                    "correlation_id": message.correlation_id,
                    "reason": reason,
                }),
            )
            .await;

        Ok(id)
    }
}
