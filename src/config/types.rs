//! Configuration data types.

use crate::metrics::DEFAULT_DURATION_BUCKETS;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address and port to listen on
    #[serde(default = "default_listen_address")]
    pub listen: SocketAddr,

    /// How long to wait for open connections on shutdown
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_address(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Path of the exposition endpoint
    #[serde(default = "default_metrics_path")]
    pub path: String,

    /// Upper bounds of the request duration histogram, in seconds
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            duration_buckets: default_duration_buckets(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_duration_buckets() -> Vec<f64> {
    DEFAULT_DURATION_BUCKETS.to_vec()
}

/// Serde adapter for humantime durations ("10s", "1m 30s").
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
