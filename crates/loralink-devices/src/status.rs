//! Gateway status monitor.
//!
//! Gateways publish retained announcements on `gateway/{id}/status` when
//! their broker connection comes up, and leave a last-will `disconnected`
//! announcement behind for unclean exits. This handler folds those reports
//! into the [`ConnectionRegistry`] so liveness listings reflect broker-side
//! reality, not just the signaling channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use loralink_core::topic;
use loralink_transport::{HandlerError, MessageHandler, SubscribeError, Transport};

use crate::registry::ConnectionRegistry;
use crate::session::SessionStatus;

/// Status announcement published by a gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusAnnouncement {
    /// Reported state, e.g. `connected`, `busy`, `disconnected`.
    pub status: String,
    /// When the gateway published the report.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Gateway id as the gateway sees it; the topic segment is authoritative.
    #[serde(default)]
    pub gateway_id: Option<String>,
}

/// Counters kept by the status monitor.
#[derive(Debug, Default)]
struct StatusMonitorStats {
    reports: AtomicU64,
    unknown_gateway: AtomicU64,
    malformed: AtomicU64,
}

/// Snapshot of the status monitor counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatusMonitorStatsSnapshot {
    /// Reports applied to a registered session.
    pub reports: u64,
    /// Reports for gateways with no live session, dropped.
    pub unknown_gateway: u64,
    /// Payloads that failed to parse, dropped.
    pub malformed: u64,
}

/// Folds `gateway/+/status` announcements into the registry.
pub struct StatusMonitor {
    registry: Arc<ConnectionRegistry>,
    stats: StatusMonitorStats,
}

impl StatusMonitor {
    /// Create a monitor updating the given registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            stats: StatusMonitorStats::default(),
        }
    }

    /// Subscribe this monitor on the transport.
    pub async fn attach<T: Transport + ?Sized>(
        self: Arc<Self>,
        transport: &T,
    ) -> Result<(), SubscribeError> {
        transport.subscribe(topic::STATUS_FILTER, self).await
    }

    /// Counter snapshot.
    pub fn stats(&self) -> StatusMonitorStatsSnapshot {
        StatusMonitorStatsSnapshot {
            reports: self.stats.reports.load(Ordering::Relaxed),
            unknown_gateway: self.stats.unknown_gateway.load(Ordering::Relaxed),
            malformed: self.stats.malformed.load(Ordering::Relaxed),
        }
    }

    fn map_status(reported: &str) -> Option<SessionStatus> {
        match reported {
            "connected" | "available" => Some(SessionStatus::Available),
            "busy" => Some(SessionStatus::Busy),
            "disconnected" => Some(SessionStatus::Disconnected),
            _ => None,
        }
    }
}

#[async_trait]
impl MessageHandler for StatusMonitor {
    fn name(&self) -> &'static str {
        "status-monitor"
    }

    async fn on_message(&self, topic: &str, payload: &[u8]) -> Result<(), HandlerError> {
        let Some(device_id) = topic::gateway_from_topic(topic) else {
            self.stats.malformed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        let announcement: StatusAnnouncement = match serde_json::from_slice(payload) {
            Ok(a) => a,
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(device_id, "dropping malformed status report: {e}");
                return Ok(());
            }
        };

        let Some(status) = Self::map_status(&announcement.status) else {
            self.stats.malformed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(device_id, reported = %announcement.status, "unrecognised status");
            return Ok(());
        };

        self.stats.reports.fetch_add(1, Ordering::Relaxed);

        if self.registry.set_status(device_id, status).await {
            tracing::debug!(device_id, %status, "gateway status updated");
        } else {
            // Status traffic for gateways with no live session is expected
            // (retained messages outlive sessions); count it and move on.
            self.stats.unknown_gateway.fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }
}
