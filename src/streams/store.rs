//! Append-only log store primitives
//!
//! The stream client only ever talks to the store through [`StreamStore`],
//! which mirrors the Redis Streams commands it needs (XADD, XGROUP, XREADGROUP,
//! XACK, XPENDING, XINFO, XTRIM).

use crate::streams::error::{StreamError, StreamResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Field set of one stream entry
pub type EntryFields = HashMap<String, String>;

/// Store-assigned entry id (`<ms>-<seq>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EntryId {
    /// Milliseconds timestamp
    pub ms: u64,
    /// Sequence number within the millisecond
    pub seq: u64,
}

impl EntryId {
    pub const MIN: EntryId = EntryId { ms: 0, seq: 0 };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Smallest id created at or after the given millisecond
    pub fn from_millis(ms: u64) -> Self {
        Self { ms, seq: 0 }
    }

    /// Next id after this one at time `now_ms`
    pub fn next_after(&self, now_ms: u64) -> Self {
        if now_ms > self.ms {
            Self::new(now_ms, 0)
        } else {
            Self::new(self.ms, self.seq + 1)
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StreamError::InvalidMessage(format!("invalid entry id '{}'", s));
        match s.split_once('-') {
            Some((ms, seq)) => Ok(Self {
                ms: ms.parse().map_err(|_| invalid())?,
                seq: seq.parse().map_err(|_| invalid())?,
            }),
            None => Ok(Self {
                ms: s.parse().map_err(|_| invalid())?,
                seq: 0,
            }),
        }
    }
}

/// One entry read from a stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: EntryFields,
}

/// Outcome of a group creation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCreation {
    Created,
    AlreadyExists,
}

/// Outcome of a consumer-group read
#[derive(Debug, Clone, PartialEq)]
pub enum GroupRead {
    /// Newly delivered entries, possibly none after the block timeout
    Entries(Vec<StreamEntry>),
    /// The group (or its stream) does not exist
    NoGroup,
}

/// Entry delivered to a group but not yet acknowledged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub id: String,
    pub consumer: String,
    /// Milliseconds since the last delivery
    pub idle_ms: u64,
    pub delivery_count: u64,
}

/// Consumer group summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: String,
    pub consumers: u64,
    pub pending: u64,
    pub last_delivered_id: String,
}

/// Stream summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub length: u64,
    pub first_entry_id: Option<String>,
    pub last_entry_id: Option<String>,
    pub groups: Vec<GroupInfo>,
}

/// Append-only log store
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Check the store is reachable
    async fn ping(&self) -> StreamResult<()>;

    /// Whether a stream key exists
    async fn exists(&self, stream: &str) -> StreamResult<bool>;

    /// Append an entry with a store-assigned id, capping length approximately
    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
        max_len: Option<usize>,
    ) -> StreamResult<String>;

    /// Create a consumer group at `start_id`
    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start_id: &str,
        mkstream: bool,
    ) -> StreamResult<GroupCreation>;

    /// Remove a consumer group; returns whether it existed
    async fn destroy_group(&self, stream: &str, group: &str) -> StreamResult<bool>;

    /// Read up to `count` never-delivered entries for `consumer`.
    ///
    /// `block_ms` follows XREADGROUP: `None` returns immediately, `Some(0)`
    /// waits indefinitely.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: Option<u64>,
    ) -> StreamResult<GroupRead>;

    /// Acknowledge entries; returns how many were pending
    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> StreamResult<u64>;

    /// Delivered but unacknowledged entries, oldest first
    async fn pending(&self, stream: &str, group: &str, count: usize) -> StreamResult<Vec<PendingEntry>>;

    /// Stream length, first/last entry and groups
    async fn info(&self, stream: &str) -> StreamResult<StreamInfo>;

    /// Remove entries with ids below `min_id`; returns removed count
    async fn trim_min_id(&self, stream: &str, min_id: &str) -> StreamResult<u64>;

    /// Number of entries in a stream (0 when missing)
    async fn len(&self, stream: &str) -> StreamResult<u64>;

    /// Release connections
    async fn close(&self) -> StreamResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_parse_and_display() {
        let id: EntryId = "1700000000000-3".parse().unwrap();
        assert_eq!(id, EntryId::new(1_700_000_000_000, 3));
        assert_eq!(id.to_string(), "1700000000000-3");
        assert_eq!("42".parse::<EntryId>().unwrap(), EntryId::new(42, 0));
        assert!("abc-1".parse::<EntryId>().is_err());
        assert!("1-".parse::<EntryId>().is_err());
    }

    #[test]
    fn test_entry_id_ordering() {
        assert!(EntryId::new(1, 5) < EntryId::new(2, 0));
        assert!(EntryId::new(2, 0) < EntryId::new(2, 1));
        assert_eq!(EntryId::MIN, EntryId::new(0, 0));
    }

    #[test]
    fn test_next_after_is_monotonic() {
        let last = EntryId::new(100, 7);
        assert_eq!(last.next_after(100), EntryId::new(100, 8));
        assert_eq!(last.next_after(50), EntryId::new(100, 8));
        assert_eq!(last.next_after(101), EntryId::new(101, 0));
    }
}
