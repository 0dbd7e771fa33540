//! Pub/sub transport adapter for the LoraLink control plane.
//!
//! This crate is the only place that talks MQTT. It exposes:
//!
//! - The [`Transport`] seam ([`traits`]): `publish` / `subscribe` with named
//!   message handlers, so the correlation and registry layers never see a
//!   broker client directly and tests can swap in an in-process transport.
//! - [`MqttTransport`] ([`mqtt`]): the `rumqttc`-backed implementation with a
//!   background dispatch loop and reconnect policy.
//! - [`EmbeddedBroker`] ([`broker`], feature `embedded-broker`): an
//!   in-process `rumqttd` broker for single-binary deployments.

pub mod mqtt;
pub mod traits;

#[cfg(feature = "embedded-broker")]
pub mod broker;

// Re-exports
pub use mqtt::{ConnectionStatus, MqttTransport};
pub use traits::{HandlerError, MessageHandler, PublishError, Qos, SubscribeError, Transport};

#[cfg(feature = "embedded-broker")]
pub use broker::{is_broker_running, is_port_available, BrokerError, EmbeddedBroker};
