use crate::cache::CacheSettings;
use crate::connection::address_scheme;
use crate::utils::error::{PlcCacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_lease_ms")]
    pub max_lease_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Addresses to start connecting to at startup.
    #[serde(default)]
    pub prewarm: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String, // "json" or "pretty"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_api_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_api_bind_port")]
    pub bind_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,
    #[serde(default = "default_telemetry_max_events")]
    pub max_events: usize,
    #[serde(default = "default_telemetry_retention_hours")]
    pub retention_hours: u64,
}

fn default_acquire_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_max_lease_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_api_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_bind_port() -> u16 {
    9102
}

fn default_telemetry_enabled() -> bool {
    true
}

fn default_telemetry_max_events() -> usize {
    1000
}

fn default_telemetry_retention_hours() -> u64 {
    24
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: default_acquire_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_lease_ms: default_max_lease_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_api_bind_address(),
            bind_port: default_api_bind_port(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            max_events: default_telemetry_max_events(),
            retention_hours: default_telemetry_retention_hours(),
        }
    }
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            max_lease_time: Duration::from_millis(config.max_lease_ms),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| PlcCacheError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| PlcCacheError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // A zero acquire timeout is allowed: callers then only ever get an
        // idle connection or an immediate timeout.
        if self.cache.request_timeout_ms == 0 {
            return Err(PlcCacheError::Config(
                "cache.request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.cache.max_lease_ms == 0 {
            return Err(PlcCacheError::Config(
                "cache.max_lease_ms must be greater than 0".to_string(),
            ));
        }

        if !matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(PlcCacheError::Config(format!(
                "Invalid log level: {}. Must be one of trace, debug, info, warn, error",
                self.logging.level
            )));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(PlcCacheError::Config(format!(
                "Invalid log format: {}. Must be 'pretty' or 'json'",
                self.logging.format
            )));
        }

        for address in &self.pool.prewarm {
            address_scheme(address).map_err(|e| PlcCacheError::Config(e.to_string()))?;
        }

        if self.api.enabled && self.api.bind_address.trim().is_empty() {
            return Err(PlcCacheError::Config(
                "api.bind_address cannot be empty when the API is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example<P: AsRef<Path>>(path: P) -> Result<()> {
        let example = r#"# plccache configuration

[cache]
acquire_timeout_ms = 10000  # How long a caller waits in the queue for the connection
request_timeout_ms = 5000   # Deadline of every read/write/browse on a borrowed connection
max_lease_ms = 5000         # Borrows held longer are reclaimed by the watchdog

[pool]
# Connections established at startup
prewarm = ["loopback://demo"]

[logging]
level = "info"  # Options: "trace", "debug", "info", "warn", "error"
format = "pretty"  # Options: "pretty", "json"

[api]
enabled = false
bind_address = "127.0.0.1"
bind_port = 9102

[telemetry]
enabled = true
max_events = 1000
retention_hours = 24
"#;

        std::fs::write(path.as_ref(), example).map_err(|e| {
            PlcCacheError::Config(format!("Failed to write example config: {}", e))
        })?;

        Ok(())
    }
}
