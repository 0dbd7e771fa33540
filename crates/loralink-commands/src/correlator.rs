//! Command correlator.
//!
//! Tracks every in-flight command and settles each one exactly once with the
//! first of: a matching response, the deadline, or a synchronous publish
//! failure. All three paths race on the same atomic test-and-remove against
//! the pending map, so a response and a timeout can never both win.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use loralink_core::config::CommandConfig;
use loralink_core::envelope::{CommandAction, CommandEnvelope, ResponseBody};
use loralink_core::{topic, CorrelationId, DeviceId};
use loralink_transport::{PublishError, Qos, Transport};

use crate::correlation::CorrelationIdGenerator;

/// Command failure, surfaced to the single caller awaiting that command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Rejected before any network I/O.
    #[error("invalid command: {0}")]
    Validation(String),

    /// The transport refused the publish.
    #[error("failed to publish command: {0}")]
    Publish(#[from] PublishError),

    /// No response arrived within the deadline.
    #[error("no response from gateway within {0:?}")]
    Timeout(Duration),

    /// The gateway answered with `success: false`.
    #[error("gateway rejected command: {0}")]
    Remote(String),

    /// The correlator dropped the settlement sink without settling. Should
    /// not happen; kept as a safety valve so callers never hang.
    #[error("command was dropped before settlement")]
    Dropped,
}

/// What a settlement attempt found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The command was pending; this settlement won.
    Settled,
    /// No such pending command: late, duplicated, or never issued.
    Unmatched,
}

/// One in-flight command. Removed from the pending map at settlement.
struct PendingCommand {
    device_id: DeviceId,
    issued_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    settle: oneshot::Sender<Result<ResponseBody, CommandError>>,
}

/// Introspection view of one pending command.
#[derive(Debug, Clone, Serialize)]
pub struct PendingCommandInfo {
    /// Correlation id of the command.
    pub correlation_id: CorrelationId,
    /// Target gateway.
    pub device_id: DeviceId,
    /// When the command was issued.
    pub issued_at: DateTime<Utc>,
    /// When the timeout fires.
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    succeeded: AtomicU64,
    remote_failures: AtomicU64,
    timeouts: AtomicU64,
    publish_failures: AtomicU64,
}

/// Snapshot of correlator counters.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelatorStats {
    /// Commands issued.
    pub sent: u64,
    /// Commands settled with a successful response.
    pub succeeded: u64,
    /// Commands the gateway answered with `success: false`.
    pub remote_failures: u64,
    /// Commands settled by the deadline timer.
    pub timeouts: u64,
    /// Commands settled by a synchronous publish failure.
    pub publish_failures: u64,
    /// Commands currently pending.
    pub in_flight: usize,
}

/// Issues commands to gateways and matches them to their responses.
///
/// Constructed once at startup and shared via `Arc`; `send` may be called
/// concurrently for the same or different devices; there is no per-device
/// queueing here, and correctness depends only on correlation-id matching,
/// never on arrival order.
pub struct CommandCorrelator {
    transport: Arc<dyn Transport>,
    pending: Arc<DashMap<CorrelationId, PendingCommand>>,
    ids: CorrelationIdGenerator,
    counters: Arc<Counters>,
    default_timeout: Duration,
    qos: Qos,
}

impl CommandCorrelator {
    /// Create a correlator publishing through the given transport.
    pub fn new(transport: Arc<dyn Transport>, config: &CommandConfig) -> Self {
        Self {
            transport,
            pending: Arc::new(DashMap::new()),
            ids: CorrelationIdGenerator::new(),
            counters: Arc::new(Counters::default()),
            default_timeout: config.default_timeout(),
            qos: Qos::AtLeastOnce,
        }
    }

    /// Override the QoS used for command publishes.
    pub fn with_qos(mut self, qos: Qos) -> Self {
        self.qos = qos;
        self
    }

    /// Issue a command with the configured default deadline.
    pub async fn send(
        &self,
        device_id: &str,
        action: CommandAction,
        data: serde_json::Value,
    ) -> Result<ResponseBody, CommandError> {
        self.send_with_timeout(device_id, action, data, self.default_timeout)
            .await
    }

    /// Issue a command and wait for its settlement.
    ///
    /// Whether the target gateway is registered anywhere is deliberately not
    /// checked: a command to an absent device publishes normally and settles
    /// by timeout.
    pub async fn send_with_timeout(
        &self,
        device_id: &str,
        action: CommandAction,
        data: serde_json::Value,
        timeout: Duration,
    ) -> Result<ResponseBody, CommandError> {
        if device_id.trim().is_empty() {
            return Err(CommandError::Validation("device id is required".into()));
        }

        let correlation_id = self.ids.next_id();
        let envelope = CommandEnvelope::new(correlation_id.clone(), action, data);
        let payload = serde_json::to_vec(&envelope)
            .map_err(|e| CommandError::Validation(format!("unserializable command data: {e}")))?;

        let issued_at = Utc::now();
        let deadline = issued_at
            + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero());

        let (settle_tx, settle_rx) = oneshot::channel();
        self.pending.insert(
            correlation_id.clone(),
            PendingCommand {
                device_id: device_id.to_string(),
                issued_at,
                deadline,
                settle: settle_tx,
            },
        );
        self.counters.sent.fetch_add(1, Ordering::Relaxed);

        // Deadline timer. Cancelled on settlement as a best effort; if
        // cancellation loses the race with firing, the remove() below finds
        // the entry gone and the duplicate is absorbed.
        let timer = {
            let pending = Arc::clone(&self.pending);
            let counters = Arc::clone(&self.counters);
            let correlation_id = correlation_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some((_, entry)) = pending.remove(&correlation_id) {
                    counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        device_id = %entry.device_id,
                        "command timed out after {:?}",
                        timeout
                    );
                    let _ = entry.settle.send(Err(CommandError::Timeout(timeout)));
                }
            })
        };

        tracing::debug!(
            correlation_id = %correlation_id,
            device_id,
            action = %envelope.action,
            "publishing command"
        );

        if let Err(e) = self
            .transport
            .publish(&topic::command_topic(device_id), payload, self.qos)
            .await
        {
            // Synchronous publish failure settles immediately, unless the
            // timer already won, in which case the entry is gone.
            if let Some((_, entry)) = self.pending.remove(&correlation_id) {
                self.counters.publish_failures.fetch_add(1, Ordering::Relaxed);
                let _ = entry.settle.send(Err(CommandError::Publish(e)));
            }
        }

        let outcome = settle_rx.await.unwrap_or(Err(CommandError::Dropped));
        timer.abort();
        outcome
    }

    /// Settle a pending command with a gateway response.
    ///
    /// The first settlement wins; late or duplicated responses find the entry
    /// already removed and report [`SettleOutcome::Unmatched`].
    pub fn settle_response(&self, correlation_id: &str, body: ResponseBody) -> SettleOutcome {
        match self.pending.remove(correlation_id) {
            Some((_, entry)) => {
                let outcome = if body.success {
                    self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    Ok(body)
                } else {
                    self.counters.remote_failures.fetch_add(1, Ordering::Relaxed);
                    Err(CommandError::Remote(body.message.clone()))
                };
                let _ = entry.settle.send(outcome);
                SettleOutcome::Settled
            }
            None => SettleOutcome::Unmatched,
        }
    }

    /// Number of commands currently in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Introspection snapshot of every in-flight command.
    pub fn pending_commands(&self) -> Vec<PendingCommandInfo> {
        self.pending
            .iter()
            .map(|entry| PendingCommandInfo {
                correlation_id: entry.key().clone(),
                device_id: entry.device_id.clone(),
                issued_at: entry.issued_at,
                deadline: entry.deadline,
            })
            .collect()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CorrelatorStats {
        CorrelatorStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            remote_failures: self.counters.remote_failures.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            publish_failures: self.counters.publish_failures.load(Ordering::Relaxed),
            in_flight: self.pending.len(),
        }
    }
}
