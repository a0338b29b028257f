//! Configuration loading
//!
//! Bootstrap configuration is resolved in priority order:
//! 1. Command-line argument (handled by the binary, applied last)
//! 2. Environment variables (`ERFX_*`)
//! 3. TOML config file
//! 4. Compiled defaults
//!
//! A missing config file is not an error; the service starts on defaults.
//! Loading does not log: it runs before tracing is installed, so the caller
//! reports the returned [`ConfigSource`] once logging is up.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "ERFX_CONFIG";

/// Largest packet MQTT 3.1.1 can frame (remaining length limit)
pub const MQTT_MAX_PACKET_BYTES: usize = 268_435_455;

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No config file found; compiled defaults (plus env overrides)
    Defaults,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ErfxConfig {
    pub mqtt: MqttConfig,
    pub heartbeat: HeartbeatConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

/// Broker connection settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    /// Suffixed with a fresh random token on every connection attempt
    pub client_id_prefix: String,
    /// Inbound inspection results (subscribed with QoS 1)
    pub result_topic: String,
    /// Fixed wait between a disconnect and the next connect attempt
    pub reconnect_delay_ms: u64,
    pub keep_alive_secs: u64,
    pub clean_session: bool,
    /// Largest MQTT packet accepted or sent; a bigger inbound result would
    /// otherwise tear the session down
    pub max_packet_bytes: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id_prefix: "ErfxWebServer".to_string(),
            result_topic: "erfx/inspector/result".to_string(),
            reconnect_delay_ms: 5000,
            keep_alive_secs: 30,
            clean_session: true,
            max_packet_bytes: MQTT_MAX_PACKET_BYTES,
        }
    }
}

impl MqttConfig {
    /// Build a client id unique to one connection attempt
    ///
    /// Reusing an id after a drop can collide with the broker's stale session,
    /// so every attempt gets its own.
    pub fn new_client_id(&self) -> String {
        format!("{}_{}", self.client_id_prefix, Uuid::new_v4().simple())
    }
}

/// Liveness announcement settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Delay before the first heartbeat after each (re)connect
    pub initial_delay_ms: u64,
    pub topic: String,
    pub source: String,
    pub version: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 30_000,
            initial_delay_ms: 1_000,
            topic: "erfx/webserver/status".to_string(),
            source: "WebServer".to_string(),
            version: "1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5080".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ErfxConfig {
    /// Parse configuration from TOML text; absent keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from a specific TOML file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Resolve, load, apply `ERFX_*` overrides and validate
    ///
    /// An explicit path (argument or `ERFX_CONFIG`) must exist; the default
    /// locations are optional.
    pub fn load(explicit_path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
            .or_else(default_config_file);

        let (mut config, source) = match path {
            Some(path) => (Self::load_file(&path)?, ConfigSource::File(path)),
            None => (Self::default(), ConfigSource::Defaults),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok((config, source))
    }

    /// Apply `ERFX_*` overrides from a lookup function (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ERFX_MQTT_BROKER_HOST") {
            self.mqtt.broker_host = v;
        }
        if let Some(v) = lookup("ERFX_MQTT_BROKER_PORT") {
            self.mqtt.broker_port = parse_value("ERFX_MQTT_BROKER_PORT", &v)?;
        }
        if let Some(v) = lookup("ERFX_MQTT_CLIENT_ID_PREFIX") {
            self.mqtt.client_id_prefix = v;
        }
        if let Some(v) = lookup("ERFX_MQTT_RESULT_TOPIC") {
            self.mqtt.result_topic = v;
        }
        if let Some(v) = lookup("ERFX_MQTT_MAX_PACKET_BYTES") {
            self.mqtt.max_packet_bytes = parse_value("ERFX_MQTT_MAX_PACKET_BYTES", &v)?;
        }
        if let Some(v) = lookup("ERFX_HEARTBEAT_ENABLED") {
            self.heartbeat.enabled = parse_bool("ERFX_HEARTBEAT_ENABLED", &v)?;
        }
        if let Some(v) = lookup("ERFX_HEARTBEAT_INTERVAL_MS") {
            self.heartbeat.interval_ms = parse_value("ERFX_HEARTBEAT_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("ERFX_HEARTBEAT_TOPIC") {
            self.heartbeat.topic = v;
        }
        if let Some(v) = lookup("ERFX_DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ERFX_HTTP_BIND_ADDR") {
            self.http.bind_addr = v;
        }
        if let Some(v) = lookup("ERFX_LOG_LEVEL") {
            self.logging.level = v;
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.broker_host.trim().is_empty() {
            return Err(Error::Config("mqtt.broker_host must not be empty".to_string()));
        }
        if self.mqtt.client_id_prefix.trim().is_empty() {
            return Err(Error::Config("mqtt.client_id_prefix must not be empty".to_string()));
        }
        if self.mqtt.result_topic.trim().is_empty() {
            return Err(Error::Config("mqtt.result_topic must not be empty".to_string()));
        }
        if self.mqtt.max_packet_bytes == 0 || self.mqtt.max_packet_bytes > MQTT_MAX_PACKET_BYTES {
            return Err(Error::Config(format!(
                "mqtt.max_packet_bytes must be between 1 and {}",
                MQTT_MAX_PACKET_BYTES
            )));
        }
        if self.heartbeat.enabled {
            if self.heartbeat.interval_ms == 0 {
                return Err(Error::Config("heartbeat.interval_ms must be > 0".to_string()));
            }
            if self.heartbeat.topic.trim().is_empty() {
                return Err(Error::Config("heartbeat.topic must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, raw)))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{} has invalid value '{}'", key, raw))),
    }
}

/// First existing default config file: user config dir, then `/etc/erfx`
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("erfx").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/erfx/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("erfx"))
        .unwrap_or_else(|| PathBuf::from("./erfx_data"))
        .join("inspections.db")
}
