use crate::streams::error::{StreamError, StreamResult};
use crate::streams::store::{
    EntryFields, EntryId, GroupCreation, GroupInfo, GroupRead, PendingEntry, StreamEntry,
    StreamInfo, StreamStore,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug)]
struct PendingState {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

#[derive(Debug, Default)]
struct GroupState {
    last_delivered: EntryId,
    pending: BTreeMap<EntryId, PendingState>,
    consumers: HashSet<String>,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: BTreeMap<EntryId, EntryFields>,
    last_id: EntryId,
    groups: BTreeMap<String, GroupState>,
}

/// In-process log store with Redis Streams semantics (for testing and development)
#[derive(Clone, Default)]
pub struct InMemoryStreamStore {
    streams: Arc<DashMap<String, StreamState>>,
    appended: Arc<Notify>,
}

impl InMemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry at an explicit id.
    ///
    /// Unlike [`StreamStore::append`] the id may be older than existing
    /// entries, which lets retention tests fabricate aged data. Group cursors
    /// are not rewound, so seeded entries older than a cursor are never
    /// delivered.
    pub fn insert_with_id(&self, stream: &str, id: EntryId, fields: &[(String, String)]) {
        let mut state = self.streams.entry(stream.to_string()).or_default();
        state.entries.insert(id, fields.iter().cloned().collect());
        if id > state.last_id {
            state.last_id = id;
        }
        drop(state);
        self.appended.notify_waiters();
    }

    fn try_read(&self, stream: &str, group: &str, consumer: &str, count: usize) -> GroupRead {
        let Some(mut state) = self.streams.get_mut(stream) else {
            return GroupRead::NoGroup;
        };
        let StreamState { entries, groups, .. } = &mut *state;
        let Some(group) = groups.get_mut(group) else {
            return GroupRead::NoGroup;
        };
        group.consumers.insert(consumer.to_string());

        let limit = if count == 0 { usize::MAX } else { count };
        let batch: Vec<StreamEntry> = entries
            .range((Bound::Excluded(group.last_delivered), Bound::Unbounded))
            .take(limit)
            .map(|(id, fields)| StreamEntry {
                id: id.to_string(),
                fields: fields.clone(),
            })
            .collect();

        let now = Instant::now();
        for entry in &batch {
            if let Ok(id) = entry.id.parse::<EntryId>() {
                group.last_delivered = id;
                group.pending.insert(
                    id,
                    PendingState {
                        consumer: consumer.to_string(),
                        delivered_at: now,
                        delivery_count: 1,
                    },
                );
            }
        }

        GroupRead::Entries(batch)
    }
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[async_trait]
impl StreamStore for InMemoryStreamStore {
    async fn ping(&self) -> StreamResult<()> {
        Ok(())
    }

    async fn exists(&self, stream: &str) -> StreamResult<bool> {
        Ok(self.streams.contains_key(stream))
    }

    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
        max_len: Option<usize>,
    ) -> StreamResult<String> {
        let id = {
            let mut state = self.streams.entry(stream.to_string()).or_default();
            let id = state.last_id.next_after(now_millis());
            state.entries.insert(id, fields.iter().cloned().collect());
            state.last_id = id;

            if let Some(max_len) = max_len {
                while state.entries.len() > max_len {
                    state.entries.pop_first();
                }
            }
            id
        };

        self.appended.notify_waiters();
        Ok(id.to_string())
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start_id: &str,
        mkstream: bool,
    ) -> StreamResult<GroupCreation> {
        if !mkstream && !self.streams.contains_key(stream) {
            return Err(StreamError::Command(format!(
                "stream '{}' does not exist and MKSTREAM was not requested",
                stream
            )));
        }

        let mut state = self.streams.entry(stream.to_string()).or_default();
        if state.groups.contains_key(group) {
            return Ok(GroupCreation::AlreadyExists);
        }

        let last_delivered = match start_id {
            "$" => state.last_id,
            other => other.parse::<EntryId>()?,
        };
        state.groups.insert(
            group.to_string(),
            GroupState {
                last_delivered,
                ..Default::default()
            },
        );
        Ok(GroupCreation::Created)
    }

    async fn destroy_group(&self, stream: &str, group: &str) -> StreamResult<bool> {
        Ok(self
            .streams
            .get_mut(stream)
            .map(|mut state| state.groups.remove(group).is_some())
            .unwrap_or(false))
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: Option<u64>,
    ) -> StreamResult<GroupRead> {
        let deadline = match block_ms {
            Some(0) | None => None,
            Some(ms) => Some(tokio::time::Instant::now() + Duration::from_millis(ms)),
        };

        loop {
            // Register interest before looking so an append in between is not missed
            let appended = self.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            match self.try_read(stream, group, consumer, count) {
                GroupRead::Entries(entries) if entries.is_empty() && block_ms.is_some() => {}
                outcome => return Ok(outcome),
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, appended).await.is_err() {
                        return Ok(GroupRead::Entries(Vec::new()));
                    }
                }
                None => appended.await,
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> StreamResult<u64> {
        let parsed = ids
            .iter()
            .map(|id| id.parse::<EntryId>())
            .collect::<StreamResult<Vec<_>>>()?;

        let Some(mut state) = self.streams.get_mut(stream) else {
            return Ok(0);
        };
        let Some(group) = state.groups.get_mut(group) else {
            return Ok(0);
        };

        Ok(parsed
            .iter()
            .filter(|id| group.pending.remove(*id).is_some())
            .count() as u64)
    }

    async fn pending(&self, stream: &str, group: &str, count: usize) -> StreamResult<Vec<PendingEntry>> {
        let Some(state) = self.streams.get(stream) else {
            return Ok(Vec::new());
        };
        let Some(group) = state.groups.get(group) else {
            return Ok(Vec::new());
        };

        Ok(group
            .pending
            .iter()
            .take(count)
            .map(|(id, p)| PendingEntry {
                id: id.to_string(),
                consumer: p.consumer.clone(),
                idle_ms: p.delivered_at.elapsed().as_millis() as u64,
                delivery_count: p.delivery_count,
            })
            .collect())
    }

    async fn info(&self, stream: &str) -> StreamResult<StreamInfo> {
        let Some(state) = self.streams.get(stream) else {
            return Ok(StreamInfo {
                length: 0,
                first_entry_id: None,
                last_entry_id: None,
                groups: Vec::new(),
            });
        };

        Ok(StreamInfo {
            length: state.entries.len() as u64,
            first_entry_id: state.entries.keys().next().map(ToString::to_string),
            last_entry_id: state.entries.keys().next_back().map(ToString::to_string),
            groups: state
                .groups
                .iter()
                .map(|(name, g)| GroupInfo {
                    name: name.clone(),
                    consumers: g.consumers.len() as u64,
                    pending: g.pending.len() as u64,
                    last_delivered_id: g.last_delivered.to_string(),
                })
                .collect(),
        })
    }

    async fn trim_min_id(&self, stream: &str, min_id: &str) -> StreamResult<u64> {
        let min_id = min_id.parse::<EntryId>()?;
        let Some(mut state) = self.streams.get_mut(stream) else {
            return Ok(0);
        };

        let kept = state.entries.split_off(&min_id);
        let removed = state.entries.len() as u64;
        state.entries = kept;
        Ok(removed)
    }

    async fn len(&self, stream: &str) -> StreamResult<u64> {
        Ok(self
            .streams
            .get(stream)
            .map(|state| state.entries.len() as u64)
            .unwrap_or(0))
    }

    async fn close(&self) -> StreamResult<()> {
        Ok(())
    }
}
