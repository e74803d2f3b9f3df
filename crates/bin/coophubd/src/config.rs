//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `coophub.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use coophub_adapter_http_axum::ws::WsSettings;
use serde::Deserialize;

/// Default `tracing` filter directive.
pub const DEFAULT_LOG_FILTER: &str = "coophubd=info,coophub=info,tower_http=debug";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Connection hub settings.
    pub hub: HubConfig,
    /// Schedule tick driver settings.
    pub scheduler: SchedulerConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Connection hub and WebSocket keep-alive configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Outbound frames buffered per subscriber before it is dropped.
    pub queue_capacity: usize,
    /// Seconds between Ping frames.
    pub ping_interval_secs: u64,
    /// Seconds of silence after which a connection is closed.
    pub pong_timeout_secs: u64,
}

/// Schedule tick driver configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run the tick driver at all.
    pub enabled: bool,
    /// Seconds between two evaluation passes.
    pub tick_interval_secs: u64,
}

impl Config {
    /// Load configuration from `coophub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("coophub.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("COOPHUB_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("COOPHUB_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("COOPHUB_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Ok(val) = std::env::var("COOPHUB_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("COOPHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("COOPHUB_HUB_QUEUE_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.hub.queue_capacity = capacity;
            }
        }
        if let Ok(val) = std::env::var("COOPHUB_SCHEDULER_TICK_SECS") {
            if let Ok(secs) = val.parse() {
                self.scheduler.tick_interval_secs = secs;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.hub.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "hub queue capacity must be at least 1".to_string(),
            ));
        }
        if self.hub.ping_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "ping interval must be at least 1 second".to_string(),
            ));
        }
        if self.hub.pong_timeout_secs <= self.hub.ping_interval_secs {
            return Err(ConfigError::Validation(
                "pong timeout must be longer than the ping interval".to_string(),
            ));
        }
        if self.scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "scheduler tick interval must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    /// WebSocket keep-alive timing.
    #[must_use]
    pub fn ws_settings(&self) -> WsSettings {
        WsSettings {
            ping_interval: Duration::from_secs(self.hub.ping_interval_secs),
            pong_timeout: Duration::from_secs(self.hub.pong_timeout_secs),
        }
    }

    /// Period of the schedule tick driver.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_interval_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:coophub.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            ping_interval_secs: 30,
            pong_timeout_secs: 60,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: 15,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
