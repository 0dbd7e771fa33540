//! The transport seam.
//!
//! Everything above the broker (correlator, demultiplexer, status monitor,
//! telemetry collector) talks to the pub/sub transport through these traits.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delivery-quality level attached to a publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Qos {
    /// Fire and forget.
    AtMostOnce,
    /// Delivered at least once; duplicates possible.
    #[default]
    AtLeastOnce,
    /// Delivered exactly once.
    ExactlyOnce,
}

impl Qos {
    /// Map a numeric config value (0, 1, 2) to a QoS level.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Qos::AtMostOnce),
            1 => Some(Qos::AtLeastOnce),
            2 => Some(Qos::ExactlyOnce),
            _ => None,
        }
    }
}

/// Publish failure.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("transport has no active broker session")]
    NotConnected,

    #[error("broker rejected the publish: {0}")]
    Rejected(String),
}

/// Subscription failure.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("broker rejected the subscription: {0}")]
    Rejected(String),
}

/// Failure reported by a message handler.
///
/// Handler failures are logged by the dispatch loop and never propagate into
/// it; this type exists so handlers have something structured to report.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    /// Create a handler error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A subscriber invoked once per inbound message matching its filter.
///
/// Handlers live for the whole process. They must absorb their own failures
/// where possible (log and drop); anything returned as `Err` is logged by the
/// dispatch loop and otherwise ignored.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Short name used in dispatch logs.
    fn name(&self) -> &'static str;

    /// Handle one inbound message.
    async fn on_message(&self, topic: &str, payload: &[u8]) -> Result<(), HandlerError>;
}

/// Thin facade over a publish/subscribe broker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload to a topic.
    ///
    /// Fire-and-forget from the caller's point of view: a returned `Ok` means
    /// the transport accepted the message, not that any device received it.
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: Qos) -> Result<(), PublishError>;

    /// Register a handler for every message matching `filter`.
    ///
    /// Filters use MQTT wildcards (`+` one level, `#` remainder). The
    /// subscription lasts for the lifetime of the process.
    async fn subscribe(
        &self,
        filter: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscribeError>;
}
