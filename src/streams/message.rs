//! Wire envelope exchanged with the log store
//!
//! The store only understands string-valued fields, so every envelope is
//! flattened to `field -> string` pairs: the payload is JSON-encoded, enums
//! and numbers are stringified and an absent `user_id` becomes `""`.

use crate::streams::error::{StreamError, StreamResult};
use crate::streams::events::EventPayload;
use crate::streams::store::EntryFields;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use uuid::Uuid;

/// Retry budget when none is given
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Field present only on topology marker entries
pub const MARKER_FIELD: &str = "_marker";

/// Status written on every dead-letter record
pub const DEAD_LETTER_STATUS: &str = "dead_letter";

/// Message priority.
///
/// Carried as metadata only; delivery order is always the store's id order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Event envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    /// Store-assigned entry id, empty until published
    pub id: String,
    /// Logical stream name
    pub stream: String,
    pub event_type: String,
    /// Producing service
    pub service: String,
    pub data: serde_json::Value,
    pub priority: Priority,
    /// Seconds since the epoch
    pub timestamp: f64,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Shared by every republish of the same logical message
    pub correlation_id: String,
    pub user_id: Option<String>,
}

impl StreamMessage {
    /// Create a new envelope with default priority, retry budget and a fresh correlation id
    pub fn new(
        stream: impl Into<String>,
        event_type: impl Into<String>,
        service: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: String::new(),
            stream: stream.into(),
            event_type: event_type.into(),
            service: service.into(),
            data,
            priority: Priority::Normal,
            timestamp: now_secs(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            correlation_id: Uuid::new_v4().to_string(),
            user_id: None,
        }
    }

    /// Create an envelope around a typed event
    pub fn from_event<T: EventPayload>(
        stream: impl Into<String>,
        service: impl Into<String>,
        event: &T,
    ) -> StreamResult<Self> {
        let data = serde_json::to_value(event)?;
        Ok(Self::new(stream, T::EVENT_TYPE, service, data))
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Keep an existing correlation id; empty ids are ignored
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        if !correlation_id.is_empty() {
            self.correlation_id = correlation_id;
        }
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Whether another retry is allowed
    pub fn is_retryable(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Decode the payload as a typed event, checking the discriminator first
    pub fn payload<T: EventPayload>(&self) -> StreamResult<T> {
        if self.event_type != T::EVENT_TYPE {
            return Err(StreamError::EventTypeMismatch {
                expected: T::EVENT_TYPE.to_string(),
                found: self.event_type.clone(),
            });
        }
        serde_json::from_value(self.data.clone())
            .map_err(|e| StreamError::InvalidMessage(format!("{} payload: {}", self.event_type, e)))
    }

    /// Encode into store fields
    pub fn to_fields(&self) -> StreamResult<Vec<(String, String)>> {
        let data = serde_json::to_string(&self.data)?;
        Ok(vec![
            ("id".to_string(), self.id.clone()),
            ("stream".to_string(), self.stream.clone()),
            ("event_type".to_string(), self.event_type.clone()),
            ("service".to_string(), self.service.clone()),
            ("data".to_string(), data),
            ("priority".to_string(), self.priority.to_string()),
            ("timestamp".to_string(), self.timestamp.to_string()),
            ("retry_count".to_string(), self.retry_count.to_string()),
            ("max_retries".to_string(), self.max_retries.to_string()),
            ("correlation_id".to_string(), self.correlation_id.clone()),
            (
                "user_id".to_string(),
                self.user_id.clone().unwrap_or_default(),
            ),
        ])
    }

    /// Decode store fields; `id` is the store-assigned entry id.
    ///
    /// Optional fields fall back to their defaults, while a missing event
    /// type or a malformed payload/number is an error for this entry only.
    pub fn from_fields(id: &str, fields: &EntryFields) -> StreamResult<Self> {
        let event_type = fields
            .get("event_type")
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| StreamError::InvalidMessage(format!("entry {} has no event_type", id)))?;

        let data = match fields.get("data") {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw).map_err(|e| {
                StreamError::InvalidMessage(format!("entry {} has invalid data: {}", id, e))
            })?,
            _ => serde_json::Value::Object(Default::default()),
        };

        let priority = match fields.get("priority").filter(|v| !v.is_empty()) {
            Some(raw) => Priority::from_str(raw).map_err(|_| {
                StreamError::InvalidMessage(format!("entry {} has invalid priority '{}'", id, raw))
            })?,
            None => Priority::Normal,
        };

        let timestamp = match parse_field::<f64>(id, fields, "timestamp")? {
            Some(ts) => ts,
            None => now_secs(),
        };

        Ok(Self {
            id: id.to_string(),
            stream: fields.get("stream").cloned().unwrap_or_default(),
            event_type,
            service: fields
                .get("service")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            data,
            priority,
            timestamp,
            retry_count: parse_field(id, fields, "retry_count")?.unwrap_or(0),
            max_retries: parse_field(id, fields, "max_retries")?.unwrap_or(DEFAULT_MAX_RETRIES),
            correlation_id: fields
                .get("correlation_id")
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            user_id: fields.get("user_id").filter(|v| !v.is_empty()).cloned(),
        })
    }
}

/// Terminal record appended to the dead-letter stream
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterRecord {
    pub message: StreamMessage,
    /// Logical stream the message was consumed from
    pub original_stream: String,
    /// Seconds since the epoch
    pub failed_at: f64,
    pub failure_reason: String,
}

impl DeadLetterRecord {
    pub fn new(message: StreamMessage, failure_reason: impl Into<String>) -> Self {
        Self {
            original_stream: message.stream.clone(),
            failed_at: now_secs().max(message.timestamp),
            failure_reason: failure_reason.into(),
            message,
        }
    }

    pub fn to_fields(&self) -> StreamResult<Vec<(String, String)>> {
        let mut fields = self.message.to_fields()?;
        fields.push(("original_stream".to_string(), self.original_stream.clone()));
        fields.push(("failed_at".to_string(), self.failed_at.to_string()));
        fields.push(("status".to_string(), DEAD_LETTER_STATUS.to_string()));
        fields.push(("failure_reason".to_string(), self.failure_reason.clone()));
        Ok(fields)
    }

    pub fn from_fields(id: &str, fields: &EntryFields) -> StreamResult<Self> {
        let message = StreamMessage::from_fields(id, fields)?;
        let failed_at = parse_field::<f64>(id, fields, "failed_at")?.ok_or_else(|| {
            StreamError::InvalidMessage(format!("dead-letter entry {} has no failed_at", id))
        })?;
        Ok(Self {
            original_stream: fields
                .get("original_stream")
                .cloned()
                .unwrap_or_else(|| message.stream.clone()),
            failed_at,
            failure_reason: fields.get("failure_reason").cloned().unwrap_or_default(),
            message,
        })
    }
}

/// Whether an entry is a topology marker rather than an event
pub fn is_marker(fields: &EntryFields) -> bool {
    fields.contains_key(MARKER_FIELD)
}

/// Current time as fractional seconds since the epoch
pub fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

fn parse_field<T: FromStr>(id: &str, fields: &EntryFields, name: &str) -> StreamResult<Option<T>> {
    match fields.get(name).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            StreamError::InvalidMessage(format!("entry {} has invalid {} '{}'", id, name, raw))
        }),
        None => Ok(None),
    }
}
