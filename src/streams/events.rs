//! Typed event payloads
//!
//! On the wire a payload is an opaque JSON blob; its schema is selected by
//! the envelope's `event_type`. Producers that want validation publish one of
//! the types below, consumers decode with [`StreamMessage::payload`] or
//! [`PlatformEvent::from_message`].

use crate::streams::error::StreamResult;
use crate::streams::message::StreamMessage;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

/// A payload schema bound to one `event_type` discriminator
pub trait EventPayload: Serialize + DeserializeOwned {
    const EVENT_TYPE: &'static str;
}

/// Asset found during discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDiscovered {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

impl EventPayload for AssetDiscovered {
    const EVENT_TYPE: &'static str = "asset.discovered";
}

/// Asset attributes changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetUpdated {
    pub asset_id: String,
    #[serde(default)]
    pub changes: HashMap<String, serde_json::Value>,
}

impl EventPayload for AssetUpdated {
    const EVENT_TYPE: &'static str = "asset.updated";
}

/// Automation job accepted by a runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationJobStarted {
    pub job_id: String,
    pub playbook: String,
    #[serde(default)]
    pub targets: Vec<String>,
}

impl EventPayload for AutomationJobStarted {
    const EVENT_TYPE: &'static str = "automation.job_started";
}

/// Automation job finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationJobCompleted {
    pub job_id: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventPayload for AutomationJobCompleted {
    const EVENT_TYPE: &'static str = "automation.job_completed";
}

/// User account created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl EventPayload for UserCreated {
    const EVENT_TYPE: &'static str = "identity.user_created";
}

/// Network scan finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkScanCompleted {
    pub scan_id: String,
    pub subnet: String,
    pub hosts_found: u32,
}

impl EventPayload for NetworkScanCompleted {
    const EVENT_TYPE: &'static str = "network.scan_completed";
}

/// AI task finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiTaskCompleted {
    pub task_id: String,
    pub intent: String,
    pub success: bool,
}

impl EventPayload for AiTaskCompleted {
    const EVENT_TYPE: &'static str = "ai.task_completed";
}

/// Free-form notification for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemNotification {
    pub level: String,
    pub message: String,
}

impl EventPayload for SystemNotification {
    const EVENT_TYPE: &'static str = "system.notification";
}

/// Union of every known payload, selected by `event_type`
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    AssetDiscovered(AssetDiscovered),
    AssetUpdated(AssetUpdated),
    AutomationJobStarted(AutomationJobStarted),
    AutomationJobCompleted(AutomationJobCompleted),
    UserCreated(UserCreated),
    NetworkScanCompleted(NetworkScanCompleted),
    AiTaskCompleted(AiTaskCompleted),
    SystemNotification(SystemNotification),
}

impl PlatformEvent {
    /// Decode a message's payload.
    ///
    /// Returns `Ok(None)` for event types without a registered schema and an
    /// error when a known event type carries a payload that does not match.
    pub fn from_message(message: &StreamMessage) -> StreamResult<Option<Self>> {
        let event = match message.event_type.as_str() {
            AssetDiscovered::EVENT_TYPE => Self::AssetDiscovered(message.payload()?),
            AssetUpdated::EVENT_TYPE => Self::AssetUpdated(message.payload()?),
            AutomationJobStarted::EVENT_TYPE => Self::AutomationJobStarted(message.payload()?),
            AutomationJobCompleted::EVENT_TYPE => Self::AutomationJobCompleted(message.payload()?),
            UserCreated::EVENT_TYPE => Self::UserCreated(message.payload()?),
            NetworkScanCompleted::EVENT_TYPE => Self::NetworkScanCompleted(message.payload()?),
            AiTaskCompleted::EVENT_TYPE => Self::AiTaskCompleted(message.payload()?),
            SystemNotification::EVENT_TYPE => Self::SystemNotification(message.payload()?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            PlatformEvent::AssetDiscovered(_) => AssetDiscovered::EVENT_TYPE,
            PlatformEvent::AssetUpdated(_) => AssetUpdated::EVENT_TYPE,
            PlatformEvent::AutomationJobStarted(_) => AutomationJobStarted::EVENT_TYPE,
            PlatformEvent::AutomationJobCompleted(_) => AutomationJobCompleted::EVENT_TYPE,
            PlatformEvent::UserCreated(_) => UserCreated::EVENT_TYPE,
            PlatformEvent::NetworkScanCompleted(_) => NetworkScanCompleted::EVENT_TYPE,
            PlatformEvent::AiTaskCompleted(_) => AiTaskCompleted::EVENT_TYPE,
            PlatformEvent::SystemNotification(_) => SystemNotification::EVENT_TYPE,
        }
    }
}
