//! Time-based retention

use crate::config::RetentionConfig;
use crate::streams::client::StreamClient;
use crate::streams::metrics::{MetricType, STREAM_METRICS};
use crate::streams::store::EntryId;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const MILLIS_PER_HOUR: u64 = 3_600_000;

/// Outcome of one retention pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Entries with ids below this were removed
    pub cutoff_id: String,
    /// Removed entries per logical stream
    pub trimmed: BTreeMap<String, u64>,
    /// Streams whose trim failed, with the error
    pub failed: BTreeMap<String, String>,
}

impl CleanupReport {
    pub fn total_trimmed(&self) -> u64 {
        self.trimmed.values().sum()
    }
}

/// Id of the oldest entry allowed to survive a sweep at `now_ms`
pub fn cutoff_id(now_ms: u64, max_age_hours: u64) -> EntryId {
    EntryId::from_millis(now_ms.saturating_sub(max_age_hours.saturating_mul(MILLIS_PER_HOUR)))
}

impl StreamClient {
    /// Remove entries older than `max_age_hours` from every registered stream
    /// and the dead-letter stream.
    ///
    /// A failing stream is logged and reported; the others are still trimmed.
    /// The metrics stream is bounded by its length cap instead.
    pub async fn cleanup(&self, max_age_hours: u64) -> CleanupReport {
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        let mut report = CleanupReport {
            cutoff_id: cutoff_id(now_ms, max_age_hours).to_string(),
            ..Default::default()
        };

        if self.is_closed() {
            return report;
        }

        for logical in self.registry.provisioned_streams() {
            let physical = self.registry.physical_name(&logical);
            match self.store.trim_min_id(&physical, &report.cutoff_id).await {
                Ok(removed) => {
                    if removed > 0 {
                        debug!(stream = %logical, removed, "Trimmed stream");
                        if self.metrics.is_enabled() {
                            STREAM_METRICS
                                .entries_trimmed
                                .with_label_values(&[&logical])
                                .inc_by(removed as f64);
                        }
                    }
                    report.trimmed.insert(logical, removed);
                }
                Err(e) => {
                    warn!(stream = %logical, error = %e, "Failed to trim stream");
                    report.failed.insert(logical, e.to_string());
                }
            }
        }

        info!(
            cutoff_id = %report.cutoff_id,
            trimmed = report.total_trimmed(),
            failed = report.failed.len(),
            "Stream cleanup completed"
        );
        self.metrics
            .record(
                MetricType::StreamsCleaned,
                json!({
                    "cutoff_id": report.cutoff_id,
                    "max_age_hours": max_age_hours,
                    "trimmed": report.total_trimmed(),
                }),
            )
            .await;

        report
    }
}

/// Periodic retention task
pub struct RetentionSweeper {
    client: StreamClient,
    interval: Duration,
    max_age_hours: u64,
}

impl RetentionSweeper {
    pub fn new(client: StreamClient, interval: Duration, max_age_hours: u64) -> Self {
        Self {
            client,
            interval: interval.max(Duration::from_secs(1)),
            max_age_hours,
        }
    }

    pub fn from_config(client: StreamClient, config: &RetentionConfig) -> Self {
        Self::new(
            client,
            Duration::from_secs(config.interval_secs),
            config.max_age_hours,
        )
    }

    /// Sweep immediately, then every interval until `shutdown` flips to true
    /// or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            max_age_hours = self.max_age_hours,
            "Retention sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Running retention sweep");
                    self.client.cleanup(self.max_age_hours).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Retention sweeper stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
