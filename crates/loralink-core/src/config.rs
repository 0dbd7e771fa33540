//! Configuration tree for the LoraLink control plane.
//!
//! Loaded from a TOML file, every field defaulting to a working single-host
//! setup:
//!
//! ```toml
//! [mqtt]
//! broker = "localhost"
//! port = 1883
//!
//! [commands]
//! default_timeout_ms = 5000
//!
//! [broker]
//! enabled = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// MQTT client settings.
    pub mqtt: MqttConfig,
    /// Command correlation settings.
    pub commands: CommandConfig,
    /// Embedded broker settings.
    pub broker: BrokerConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// MQTT client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host name or address.
    pub broker: String,

    /// Broker port.
    pub port: u16,

    /// Client id; a random one is generated when unset.
    pub client_id: Option<String>,

    /// Username for broker authentication.
    pub username: Option<String>,

    /// Password for broker authentication.
    pub password: Option<String>,

    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u64,

    /// Connect over TLS.
    pub tls: bool,

    /// QoS level for published commands (0, 1 or 2).
    pub qos: u8,

    /// Delay between reconnect attempts in milliseconds.
    pub reconnect_interval_ms: u64,

    /// Consecutive reconnect attempts before giving up; 0 retries forever.
    pub max_reconnect_attempts: u32,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: default_broker_host(),
            port: default_mqtt_port(),
            client_id: None,
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
            tls: false,
            qos: default_qos(),
            reconnect_interval_ms: default_reconnect_interval(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl MqttConfig {
    /// Create a config pointing at the given broker host.
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            ..Self::default()
        }
    }

    /// Set the broker port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set broker credentials.
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set an explicit client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// Command correlation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Deadline for a gateway to answer a command, in milliseconds.
    pub default_timeout_ms: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_command_timeout(),
        }
    }
}

impl CommandConfig {
    /// Command deadline as a [`Duration`].
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Embedded broker settings.
///
/// The daemon can host its own MQTT broker so a single binary serves small
/// fleets; point `[mqtt]` at an external broker and disable this for larger
/// deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Start the embedded broker.
    pub enabled: bool,

    /// Listening address for the embedded broker.
    pub listen: String,

    /// Listening port for the embedded broker.
    pub port: u16,

    /// Maximum number of concurrent client connections.
    pub max_connections: usize,

    /// Maximum payload size in bytes.
    pub max_payload_size: usize,

    /// Connection timeout in milliseconds.
    pub connection_timeout_ms: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_broker_listen(),
            port: default_mqtt_port(),
            max_connections: default_broker_max_connections(),
            max_payload_size: default_broker_max_payload(),
            connection_timeout_ms: default_broker_connection_timeout(),
        }
    }
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    60
}

fn default_qos() -> u8 {
    1
}

fn default_reconnect_interval() -> u64 {
    5000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_command_timeout() -> u64 {
    5000
}

fn default_broker_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_broker_max_connections() -> usize {
    1000
}

fn default_broker_max_payload() -> usize {
    1024 * 1024 // 1 MB
}

fn default_broker_connection_timeout() -> u16 {
    60000
}
