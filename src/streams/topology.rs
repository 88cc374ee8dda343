//! Stream and consumer-group provisioning

use crate::streams::error::StreamResult;
use crate::streams::message::{now_secs, MARKER_FIELD};
use crate::streams::registry::StreamRegistry;
use crate::streams::store::{GroupCreation, StreamStore};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Offset new groups start from: replay everything already in the stream
pub const GROUP_START_ID: &str = "0";

/// Result of a create-if-absent step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioning {
    Created,
    AlreadyPresent,
    Failed(String),
}

impl Provisioning {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Provisioning::Failed(_))
    }
}

/// Per-stream outcome of [`TopologyManager::initialize`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologyReport {
    pub streams: BTreeMap<String, Provisioning>,
    pub groups: BTreeMap<String, Provisioning>,
}

impl TopologyReport {
    /// Whether every stream and group is in place
    pub fn is_complete(&self) -> bool {
        self.streams.values().chain(self.groups.values()).all(Provisioning::is_ok)
    }

    /// Logical names whose stream or group could not be provisioned
    pub fn failures(&self) -> Vec<&str> {
        self.streams
            .iter()
            .chain(self.groups.iter())
            .filter(|(_, outcome)| !outcome.is_ok())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Declares streams and consumer groups; safe to run on every start and
/// concurrently with reads since every step is create-if-absent.
#[derive(Clone)]
pub struct TopologyManager {
    store: Arc<dyn StreamStore>,
    registry: Arc<StreamRegistry>,
    groups: Arc<DashMap<String, String>>,
}

impl TopologyManager {
    pub fn new(store: Arc<dyn StreamStore>, registry: Arc<StreamRegistry>) -> Self {
        Self {
            store,
            registry,
            groups: Arc::new(DashMap::new()),
        }
    }

    /// Verify liveness, then provision every stream and group.
    ///
    /// Only a failed ping is an error; individual provisioning failures are
    /// logged and reported.
    pub async fn initialize(&self) -> StreamResult<TopologyReport> {
        self.store.ping().await?;

        let mut report = TopologyReport::default();
        for logical in self.registry.provisioned_streams() {
            let outcome = self.ensure_stream(&logical).await;
            report.streams.insert(logical, outcome);
        }
        report.groups = self.ensure_groups().await;

        if report.is_complete() {
            info!(
                namespace = %self.registry.namespace(),
                streams = report.streams.len(),
                "Stream topology initialized"
            );
        } else {
            warn!(failures = ?report.failures(), "Stream topology initialized with failures");
        }
        Ok(report)
    }

    /// Append a marker entry if the stream does not exist yet
    pub async fn ensure_stream(&self, logical: &str) -> Provisioning {
        let physical = self.registry.physical_name(logical);

        match self.store.exists(&physical).await {
            Ok(true) => Provisioning::AlreadyPresent,
            Ok(false) => {
                let marker = vec![
                    (MARKER_FIELD.to_string(), "init".to_string()),
                    ("created_at".to_string(), now_secs().to_string()),
                ];
                match self.store.append(&physical, &marker, None).await {
                    Ok(_) => {
                        debug!(stream = %physical, "Created stream");
                        Provisioning::Created
                    }
                    Err(e) => {
                        warn!(stream = %physical, error = %e, "Failed to create stream");
                        Provisioning::Failed(e.to_string())
                    }
                }
            }
            Err(e) => {
                warn!(stream = %physical, error = %e, "Failed to check stream");
                Provisioning::Failed(e.to_string())
            }
        }
    }

    /// Create the consumer group of one logical stream, registered or not
    pub async fn ensure_group(&self, logical: &str) -> Provisioning {
        let physical = self.registry.physical_name(logical);
        let group = self.registry.group_name(logical);

        let outcome = match self
            .store
            .create_group(&physical, &group, GROUP_START_ID, true)
            .await
        {
            Ok(GroupCreation::Created) => {
                debug!(stream = %physical, group = %group, "Created consumer group");
                Provisioning::Created
            }
            Ok(GroupCreation::AlreadyExists) => Provisioning::AlreadyPresent,
            Err(e) => {
                warn!(stream = %physical, group = %group, error = %e, "Failed to create consumer group");
                Provisioning::Failed(e.to_string())
            }
        };

        if outcome.is_ok() {
            self.groups.insert(logical.to_string(), group);
        }
        outcome
    }

    /// (Re)create the groups of every provisioned stream
    pub async fn ensure_groups(&self) -> BTreeMap<String, Provisioning> {
        let mut outcomes = BTreeMap::new();
        for logical in self.registry.provisioned_streams() {
            let outcome = self.ensure_group(&logical).await;
            outcomes.insert(logical, outcome);
        }
        outcomes
    }

    /// Group serving a logical stream
    pub fn group_for(&self, logical: &str) -> String {
        self.groups
            .get(logical)
            .map(|g| g.value().clone())
            .unwrap_or_else(|| self.registry.group_name(logical))
    }

    /// Snapshot of the logical name -> group map
    pub fn known_groups(&self) -> HashMap<String, String> {
        self.groups
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }
}
