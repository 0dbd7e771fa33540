//! Response demultiplexer.
//!
//! One wildcard subscription (`gateway/+/response`) covers the whole fleet,
//! so gateways connecting and disconnecting never churn subscriptions. Each
//! inbound message is parsed as a [`ResponseEnvelope`] and handed to the
//! correlator; everything that cannot be attributed to a pending command
//! (malformed payloads, late responses, duplicates) is dropped where it
//! lands, observable only through counters and logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use loralink_core::envelope::ResponseEnvelope;
use loralink_core::topic;
use loralink_transport::{HandlerError, MessageHandler, SubscribeError, Transport};

use crate::correlator::{CommandCorrelator, SettleOutcome};

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    settled: AtomicU64,
    unmatched: AtomicU64,
    malformed: AtomicU64,
}

/// Snapshot of demultiplexer counters.
#[derive(Debug, Clone, Serialize)]
pub struct DemuxStats {
    /// Messages received on the response filter.
    pub received: u64,
    /// Responses that settled a pending command.
    pub settled: u64,
    /// Responses with no pending command (late, duplicate, or unknown).
    pub unmatched: u64,
    /// Payloads dropped as unparseable.
    pub malformed: u64,
}

/// Routes inbound gateway responses to the correlator.
pub struct ResponseDemultiplexer {
    correlator: Arc<CommandCorrelator>,
    counters: Counters,
}

impl ResponseDemultiplexer {
    /// Create a demultiplexer feeding the given correlator.
    pub fn new(correlator: Arc<CommandCorrelator>) -> Self {
        Self {
            correlator,
            counters: Counters::default(),
        }
    }

    /// Subscribe this demultiplexer on the transport.
    pub async fn attach<T: Transport + ?Sized>(
        self: Arc<Self>,
        transport: &T,
    ) -> Result<(), SubscribeError> {
        transport.subscribe(topic::RESPONSE_FILTER, self).await
    }

    /// Counter snapshot.
    pub fn stats(&self) -> DemuxStats {
        DemuxStats {
            received: self.counters.received.load(Ordering::Relaxed),
            settled: self.counters.settled.load(Ordering::Relaxed),
            unmatched: self.counters.unmatched.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl MessageHandler for ResponseDemultiplexer {
    fn name(&self) -> &'static str {
        "response-demux"
    }

    async fn on_message(&self, topic: &str, payload: &[u8]) -> Result<(), HandlerError> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let Some(device_id) = topic::gateway_from_topic(topic) else {
            self.counters.malformed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(topic, "response on unexpected topic shape, dropped");
            return Ok(());
        };

        let envelope: ResponseEnvelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(device_id, "dropping malformed response payload: {e}");
                return Ok(());
            }
        };

        match self
            .correlator
            .settle_response(&envelope.correlation_id, envelope.response)
        {
            SettleOutcome::Settled => {
                self.counters.settled.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    device_id,
                    correlation_id = %envelope.correlation_id,
                    "response settled command"
                );
            }
            SettleOutcome::Unmatched => {
                // Late delivery, a duplicate, or a response to a command that
                // already timed out. Expected traffic, not an error.
                self.counters.unmatched.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    device_id,
                    correlation_id = %envelope.correlation_id,
                    "response matched no pending command, dropped"
                );
            }
        }

        Ok(())
    }
}
