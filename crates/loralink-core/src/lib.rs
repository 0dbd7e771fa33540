//! Core types for the LoraLink control plane.
//!
//! This crate carries everything the other crates agree on but that owns no
//! runtime state of its own:
//!
//! - **Wire envelopes** ([`envelope`]): the JSON command/response shapes
//!   exchanged with field gateways. These are interop-critical and must not
//!   drift.
//! - **Topic grammar** ([`topic`]): the fixed MQTT topic layout and the
//!   wildcard matcher used to route inbound messages to handlers.
//! - **Configuration** ([`config`]): the TOML-backed settings tree shared by
//!   the transport, the correlator, and the embedded broker.

pub mod config;
pub mod envelope;
pub mod topic;

// Re-exports
pub use config::{BrokerConfig, CommandConfig, Config, ConfigError, MqttConfig};
pub use envelope::{CommandAction, CommandEnvelope, ResponseBody, ResponseEnvelope};

/// Unique identifier of a field gateway.
pub type DeviceId = String;

/// Opaque token linking one issued command to its eventual response.
pub type CorrelationId = String;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
