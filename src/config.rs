use crate::streams::StreamsConfig;
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Stream client configuration
    #[serde(default)]
    pub streams: StreamsConfig,

    /// Retention sweeper configuration
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load configuration, layering the given file over the built-in defaults
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            // Override with environment variables (prefix: EVENT_BUS_)
            .add_source(
                config::Environment::with_prefix("EVENT_BUS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Run the periodic sweeper
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    /// Entries older than this are trimmed
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sweep_interval(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_max_age_hours() -> u64 {
    24
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::StorageBackend;
    use std::io::Write;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_sweep_interval(), 3600);
        assert_eq!(default_max_age_hours(), 24);
        assert_eq!(default_log_level(), "info");
        assert!(default_true());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[streams]\nstorage = \"memory\"\nnamespace = \"staging\"\n\n[retention]\nmax_age_hours = 6"
        )
        .unwrap();

        let config = Config::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.streams.storage, StorageBackend::Memory);
        assert_eq!(config.streams.namespace, "staging");
        assert_eq!(config.streams.max_len, 10_000);
        assert_eq!(config.retention.max_age_hours, 6);
        assert_eq!(config.retention.interval_secs, 3600);
    }

    #[test]
    fn test_missing_file_falls_back_to_embedded_defaults() {
        let config = Config::load_from("does/not/exist").unwrap();
        assert_eq!(config.streams.namespace, "automation");
        assert!(config.streams.enable_metrics);
        assert!(!config.observability.json_logs);
    }
}
