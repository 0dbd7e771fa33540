//! Device liveness for the LoraLink control plane.
//!
//! Gateways reach the control plane two ways: a real-time signaling channel
//! that proves they are alive (and gives them an address), and the MQTT
//! topics they publish status and telemetry on. This crate tracks both:
//!
//! - [`ConnectionRegistry`]: the in-memory source of truth for which gateways
//!   currently hold a live real-time session. Fed by the signaling layer's
//!   connect/disconnect callbacks.
//! - [`StatusMonitor`]: folds broker-side `gateway/+/status` announcements
//!   (including last-will `disconnected` messages) into the registry.
//! - [`TelemetryCollector`]: caches and fans out `sensor_data/+/+` readings.
//!
//! None of this sits on the command path; the correlator publishes to a
//! device whether or not it is registered here.

pub mod registry;
pub mod session;
pub mod status;
pub mod telemetry;

// Re-exports
pub use registry::{ConnectionRegistry, RegistryEvent};
pub use session::{DeviceSession, SessionHandle, SessionSnapshot, SessionStatus};
pub use status::{StatusAnnouncement, StatusMonitor};
pub use telemetry::{SensorReading, TelemetryCollector};
