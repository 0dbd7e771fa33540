//! Device session types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use loralink_core::DeviceId;

/// Opaque identifier of one real-time channel.
///
/// Handles are minted and owned by the signaling layer; the registry only
/// stores them so disconnect notifications (which carry the handle, not the
/// device id) can be resolved. Holding a handle confers no ownership of the
/// underlying channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// Wrap a raw handle value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw handle value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Availability of a connected gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Connected and ready for commands.
    #[default]
    Available,
    /// Connected but currently executing a command.
    Busy,
    /// The gateway announced it lost its broker connection.
    Disconnected,
}

impl SessionStatus {
    /// Whether this status counts as online in liveness listings.
    pub fn is_online(self) -> bool {
        !matches!(self, SessionStatus::Disconnected)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::Available => "available",
            SessionStatus::Busy => "busy",
            SessionStatus::Disconnected => "disconnected",
        };
        write!(f, "{}", name)
    }
}

/// One gateway's live real-time channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSession {
    /// The gateway this session belongs to.
    pub device_id: DeviceId,
    /// Handle of the real-time channel, owned by the signaling layer.
    pub handle: SessionHandle,
    /// Network address the gateway reported on connect.
    pub address: String,
    /// Current availability.
    pub status: SessionStatus,
    /// When this session was registered.
    pub registered_at: DateTime<Utc>,
}

impl DeviceSession {
    /// Create a fresh session, available as of now.
    pub fn new(device_id: impl Into<DeviceId>, handle: SessionHandle, address: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            handle,
            address: address.into(),
            status: SessionStatus::Available,
            registered_at: Utc::now(),
        }
    }
}

/// Read-only liveness view of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The gateway id.
    pub device_id: DeviceId,
    /// Whether the gateway counts as online.
    pub online: bool,
    /// Reported network address.
    pub address: String,
    /// Current availability.
    pub status: SessionStatus,
    /// When the session was registered.
    pub registered_at: DateTime<Utc>,
}

impl From<&DeviceSession> for SessionSnapshot {
    fn from(session: &DeviceSession) -> Self {
        Self {
            device_id: session.device_id.clone(),
            online: session.status.is_online(),
            address: session.address.clone(),
            status: session.status,
            registered_at: session.registered_at,
        }
    }
}
