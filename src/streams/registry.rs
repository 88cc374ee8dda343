//! Logical stream names and their physical keys

use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Logical streams known to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum LogicalStream {
    Identity,
    Assets,
    Automation,
    Communication,
    AiBrain,
    NetworkAnalyzer,
    System,
}

/// Reserved stream receiving exhausted messages
pub const DEAD_LETTER_STREAM: &str = "dead_letter";

/// Reserved stream receiving metrics records
pub const METRICS_STREAM: &str = "metrics";

/// Fixed mapping from logical names to physical stream keys.
///
/// Built once from the namespace and never mutated afterwards. Unregistered
/// logical names still resolve through the same `<namespace>:<name>:events`
/// pattern so ad-hoc streams keep working.
#[derive(Debug, Clone)]
pub struct StreamRegistry {
    namespace: String,
    streams: BTreeMap<String, String>,
    dead_letter: String,
    metrics: String,
}

impl StreamRegistry {
    /// Create the registry for a namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let streams = LogicalStream::iter()
            .map(|s| {
                let name = s.to_string();
                let physical = format_stream_key(&namespace, &name);
                (name, physical)
            })
            .collect();

        Self {
            dead_letter: format_stream_key(&namespace, DEAD_LETTER_STREAM),
            metrics: format_stream_key(&namespace, METRICS_STREAM),
            namespace,
            streams,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Physical key for a logical stream, falling back to the naming pattern
    pub fn physical_name(&self, logical: &str) -> String {
        match logical {
            DEAD_LETTER_STREAM => self.dead_letter.clone(),
            METRICS_STREAM => self.metrics.clone(),
            _ => self
                .streams
                .get(logical)
                .cloned()
                .unwrap_or_else(|| format_stream_key(&self.namespace, logical)),
        }
    }

    /// Consumer group serving a logical stream
    pub fn group_name(&self, logical: &str) -> String {
        format!("{}_processors", logical)
    }

    pub fn dead_letter_stream(&self) -> &str {
        &self.dead_letter
    }

    pub fn metrics_stream(&self) -> &str {
        &self.metrics
    }

    /// Registered logical names, in stable order
    pub fn logical_streams(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    pub fn is_registered(&self, logical: &str) -> bool {
        self.streams.contains_key(logical)
    }

    /// Streams that get a marker entry and a consumer group at startup:
    /// every registered stream plus the dead-letter stream
    pub fn provisioned_streams(&self) -> Vec<String> {
        self.logical_streams()
            .map(str::to_string)
            .chain(std::iter::once(DEAD_LETTER_STREAM.to_string()))
            .collect()
    }
}

fn format_stream_key(namespace: &str, name: &str) -> String {
    format!("{}:{}:events", namespace, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_registered_names() {
        let registry = StreamRegistry::new("ops");
        assert_eq!(registry.physical_name("assets"), "ops:assets:events");
        assert_eq!(registry.physical_name("ai_brain"), "ops:ai_brain:events");
        assert_eq!(registry.logical_streams().count(), 7);
        assert!(registry.is_registered("network_analyzer"));
    }

    #[test]
    fn test_reserved_and_fallback_names() {
        let registry = StreamRegistry::new("ops");
        assert_eq!(registry.dead_letter_stream(), "ops:dead_letter:events");
        assert_eq!(registry.metrics_stream(), "ops:metrics:events");
        assert_eq!(registry.physical_name("dead_letter"), "ops:dead_letter:events");
        assert_eq!(registry.physical_name("billing"), "ops:billing:events");
        assert!(!registry.is_registered("billing"));
        assert!(!registry.is_registered("metrics"));
    }

    #[test]
    fn test_group_naming() {
        let registry = StreamRegistry::new("ops");
        assert_eq!(registry.group_name("assets"), "assets_processors");
    }

    #[test]
    fn test_provisioned_streams_include_dead_letter() {
        let registry = StreamRegistry::new("ops");
        let provisioned = registry.provisioned_streams();
        assert_eq!(provisioned.len(), 8);
        assert!(provisioned.iter().any(|s| s == "dead_letter"));
        assert!(!provisioned.iter().any(|s| s == "metrics"));
    }

    #[test]
    fn test_logical_stream_strings() {
        assert_eq!(LogicalStream::NetworkAnalyzer.to_string(), "network_analyzer");
        assert_eq!(LogicalStream::from_str("ai_brain").unwrap(), LogicalStream::AiBrain);
        assert_eq!(LogicalStream::Identity.as_ref(), "identity");
    }
}
