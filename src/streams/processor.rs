//! Consume-handle-acknowledge loop

use crate::streams::client::StreamClient;
use crate::streams::message::StreamMessage;
use crate::streams::retry::RetryOutcome;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Error returned by a [`MessageHandler`]; triggers the retry policy
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Application logic run for every consumed message
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &StreamMessage) -> Result<(), HandlerError>;
}

/// What happened to one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Handled and acknowledged
    Acknowledged,
    /// Handler failed; a successor was published and the original acknowledged
    Retried,
    /// Handler failed for the last time; moved to the dead-letter stream
    DeadLettered,
    /// Handler failed and nothing could be appended; left pending
    LeftPending,
    /// Handled or settled, but the entry could not be acknowledged and stays pending
    AckFailed,
}

/// Counts for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub acknowledged: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub left_pending: usize,
    pub ack_failed: usize,
}

impl BatchStats {
    pub fn total(&self) -> usize {
        self.acknowledged + self.retried + self.dead_lettered + self.left_pending + self.ack_failed
    }

    fn record(&mut self, disposition: &Disposition) {
        match disposition {
            Disposition::Acknowledged => self.acknowledged += 1,
            Disposition::Retried => self.retried += 1,
            Disposition::DeadLettered => self.dead_lettered += 1,
            Disposition::LeftPending => self.left_pending += 1,
            Disposition::AckFailed => self.ack_failed += 1,
        }
    }
}

/// Drives a [`MessageHandler`] over a set of logical streams.
///
/// A failed message is republished (or dead-lettered) before its original
/// entry is acknowledged, so a crash in between duplicates work rather than
/// losing it.
pub struct StreamProcessor<H> {
    client: StreamClient,
    handler: Arc<H>,
    streams: Vec<String>,
    consumer: String,
    batch_size: usize,
    block_ms: u64,
}

impl<H: MessageHandler> StreamProcessor<H> {
    pub fn new(client: StreamClient, handler: Arc<H>, streams: Vec<String>) -> Self {
        let config = client.config();
        let consumer = config.consumer_name.clone();
        let batch_size = config.batch_size;
        let block_ms = config.block_ms;

        Self {
            client,
            handler,
            streams,
            consumer,
            batch_size,
            block_ms,
        }
    }

    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_block_ms(mut self, block_ms: u64) -> Self {
        self.block_ms = block_ms;
        self
    }

    /// Consume one batch and handle every message in it
    pub async fn process_batch(&self) -> BatchStats {
        let messages = self
            .client
            .consume(self.streams.as_slice(), &self.consumer, self.batch_size, self.block_ms)
            .await;
        self.handle_all(messages).await
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    ///
    /// Shutdown interrupts a blocking read but never a handler.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            streams = ?self.streams,
            consumer = %self.consumer,
            "Stream processor started"
        );

        while !*shutdown.borrow() {
            let messages = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                messages = self.client.consume(self.streams.as_slice(), &self.consumer, self.batch_size, self.block_ms) => messages,
            };

            if self.client.is_closed() {
                warn!("Stream client closed, stopping processor");
                break;
            }

            let stats = self.handle_all(messages).await;
            if stats.total() > 0 {
                debug!(
                    acknowledged = stats.acknowledged,
                    retried = stats.retried,
                    dead_lettered = stats.dead_lettered,
                    left_pending = stats.left_pending,
                    ack_failed = stats.ack_failed,
                    "Processed batch"
                );
            }
        }

        info!(consumer = %self.consumer, "Stream processor stopped");
    }

    async fn handle_all(&self, messages: Vec<StreamMessage>) -> BatchStats {
        let mut stats = BatchStats::default();
        for message in messages {
            let disposition = self.process(message).await;
            stats.record(&disposition);
        }
        stats
    }

    /// Handle one message and settle its entry
    pub async fn process(&self, message: StreamMessage) -> Disposition {
        let stream = message.stream.clone();
        let original_id = message.id.clone();
        let group = self.client.group_for(&stream);

        let error = match self.handler.handle(&message).await {
            Ok(()) => {
                if !self.client.acknowledge(&stream, &group, &original_id).await {
                    error!(stream = %stream, message_id = %original_id, "Handled message could not be acknowledged");
                    return Disposition::AckFailed;
                }
                return Disposition::Acknowledged;
            }
            Err(e) => e,
        };

        warn!(
            stream = %stream,
            message_id = %original_id,
            event_type = %message.event_type,
            retry_count = message.retry_count,
            error = %error,
            "Handler failed"
        );

        let mut message = message;
        let outcome = self.client.retry_message(&mut message).await;
        if !outcome.is_settled() {
            error!(stream = %stream, message_id = %original_id, "Failed message left pending");
            return Disposition::LeftPending;
        }

        if !self.client.acknowledge(&stream, &group, &original_id).await {
            error!(
                stream = %stream,
                message_id = %original_id,
                outcome = ?outcome,
                "Failed message was settled but could not be acknowledged"
            );
            return Disposition::AckFailed;
        }
        match outcome {
            RetryOutcome::Republished(_) => Disposition::Retried,
            _ => Disposition::DeadLettered,
        }
    }
}
