//! Common test utilities for stream integration tests
//!
//! Provides a store wrapper that injects failures into chosen streams or
//! operations and
//! helpers for building clients around it.

#![allow(dead_code)]

use async_trait::async_trait;
use automation_event_bus::streams::{
    GroupCreation, GroupRead, InMemoryStreamStore, PendingEntry, StreamClient, StreamError,
    StreamInfo, StreamResult, StreamStore, StreamsConfig,
};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-memory store whose appends and trims can be made to fail per stream,
/// and whose reads and acks can be made to fail altogether
#[derive(Clone, Default)]
pub struct FaultyStore {
    pub inner: InMemoryStreamStore,
    failing_appends: Arc<RwLock<HashSet<String>>>,
    failing_trims: Arc<RwLock<HashSet<String>>>,
    failing_reads: Arc<AtomicBool>,
    failing_acks: Arc<AtomicBool>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_appends_to(&self, stream: &str) {
        self.failing_appends.write().insert(stream.to_string());
    }

    pub fn restore_appends_to(&self, stream: &str) {
        self.failing_appends.write().remove(stream);
    }

    pub fn fail_trims_of(&self, stream: &str) {
        self.failing_trims.write().insert(stream.to_string());
    }

    pub fn fail_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    pub fn fail_acks(&self, failing: bool) {
        self.failing_acks.store(failing, Ordering::SeqCst);
    }

    fn injected(stream: &str) -> StreamError {
        StreamError::Command(format!("injected failure on {}", stream))
    }
}

#[async_trait]
impl StreamStore for FaultyStore {
    async fn ping(&self) -> StreamResult<()> {
        self.inner.ping().await
    }

    async fn exists(&self, stream: &str) -> StreamResult<bool> {
        self.inner.exists(stream).await
    }

    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
        max_len: Option<usize>,
    ) -> StreamResult<String> {
        if self.failing_appends.read().contains(stream) {
            return Err(Self::injected(stream));
        }
        self.inner.append(stream, fields, max_len).await
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start_id: &str,
        mkstream: bool,
    ) -> StreamResult<GroupCreation> {
        self.inner.create_group(stream, group, start_id, mkstream).await
    }

    async fn destroy_group(&self, stream: &str, group: &str) -> StreamResult<bool> {
        self.inner.destroy_group(stream, group).await
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: Option<u64>,
    ) -> StreamResult<GroupRead> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(Self::injected(stream));
        }
        self.inner
            .read_group(stream, group, consumer, count, block_ms)
            .await
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> StreamResult<u64> {
        if self.failing_acks.load(Ordering::SeqCst) {
            return Err(Self::injected(stream));
        }
        self.inner.ack(stream, group, ids).await
    }

    async fn pending(&self, stream: &str, group: &str, count: usize) -> StreamResult<Vec<PendingEntry>> {
        self.inner.pending(stream, group, count).await
    }

    async fn info(&self, stream: &str) -> StreamResult<StreamInfo> {
        self.inner.info(stream).await
    }

    async fn trim_min_id(&self, stream: &str, min_id: &str) -> StreamResult<u64> {
        if self.failing_trims.read().contains(stream) {
            return Err(Self::injected(stream));
        }
        self.inner.trim_min_id(stream, min_id).await
    }

    async fn len(&self, stream: &str) -> StreamResult<u64> {
        self.inner.len(stream).await
    }

    async fn close(&self) -> StreamResult<()> {
        self.inner.close().await
    }
}

/// Test configuration with a namespace unique to the calling test
pub fn test_config(namespace: &str) -> StreamsConfig {
    StreamsConfig {
        namespace: namespace.to_string(),
        block_ms: 10,
        ..StreamsConfig::in_memory()
    }
}

/// Initialized client over a fresh [`FaultyStore`]
pub async fn faulty_client(namespace: &str) -> (FaultyStore, StreamClient) {
    let store = FaultyStore::new();
    let client = StreamClient::with_store(Arc::new(store.clone()), test_config(namespace));
    let report = client.initialize().await.unwrap();
    assert!(report.is_complete());
    (store, client)
}
