//! Live-connection registry.
//!
//! The in-memory source of truth for which gateways currently hold a live
//! real-time session. The signaling layer calls [`ConnectionRegistry::register`]
//! when a gateway connects and [`ConnectionRegistry::unregister_by_handle`]
//! when a channel drops. Disconnect notifications identify only the handle,
//! so a handle-to-device index is maintained in the same critical section as
//! the session map to keep removal O(1) and the two maps consistent.

use std::collections::HashMap;

use tokio::sync::{broadcast, RwLock};

use loralink_core::DeviceId;

use crate::session::{DeviceSession, SessionHandle, SessionSnapshot, SessionStatus};

/// Capacity of the registry event channel; slow subscribers lag, they never
/// block registry mutation.
const EVENT_CAPACITY: usize = 64;

/// Change notification emitted by the registry.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A gateway registered a new session.
    Registered {
        device_id: DeviceId,
        address: String,
    },
    /// A gateway re-registered, replacing its previous session.
    ///
    /// The previous handle is reported so the signaling layer can reap the
    /// old channel; the registry itself never tears handles down.
    Replaced {
        device_id: DeviceId,
        previous: SessionHandle,
    },
    /// A gateway's session was removed.
    Unregistered { device_id: DeviceId },
    /// A gateway's availability changed.
    StatusChanged {
        device_id: DeviceId,
        status: SessionStatus,
    },
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<DeviceId, DeviceSession>,
    by_handle: HashMap<SessionHandle, DeviceId>,
}

/// Registry of live gateway sessions.
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
    events: broadcast::Sender<RegistryEvent>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    /// Insert or replace the session for a gateway. Always succeeds;
    /// re-registration wins over any previous session.
    pub async fn register(
        &self,
        device_id: impl Into<DeviceId>,
        handle: SessionHandle,
        address: impl Into<String>,
    ) {
        let device_id = device_id.into();
        let address = address.into();
        let session = DeviceSession::new(device_id.clone(), handle, address.clone());

        let replaced = {
            let mut inner = self.inner.write().await;
            let previous = inner.sessions.insert(device_id.clone(), session);
            if let Some(prev) = &previous {
                // A stale handle must not be able to unregister the new session.
                if prev.handle != handle {
                    inner.by_handle.remove(&prev.handle);
                }
            }
            inner.by_handle.insert(handle, device_id.clone());
            previous
        };

        match replaced {
            Some(prev) => {
                tracing::info!(device_id = %device_id, old = %prev.handle, new = %handle, "session replaced");
                self.emit(RegistryEvent::Replaced {
                    device_id,
                    previous: prev.handle,
                });
            }
            None => {
                tracing::info!(device_id = %device_id, %handle, %address, "session registered");
                self.emit(RegistryEvent::Registered { device_id, address });
            }
        }
    }

    /// Look up the live session for a gateway.
    pub async fn lookup(&self, device_id: &str) -> Option<DeviceSession> {
        self.inner.read().await.sessions.get(device_id).cloned()
    }

    /// Remove the session owned by `handle`, resolving the gateway through
    /// the handle index. Returns the affected device id, or `None` when the
    /// handle is unknown or stale (a later registration superseded it).
    pub async fn unregister_by_handle(&self, handle: SessionHandle) -> Option<DeviceId> {
        let device_id = {
            let mut inner = self.inner.write().await;
            let device_id = inner.by_handle.remove(&handle)?;
            match inner.sessions.get(&device_id) {
                Some(session) if session.handle == handle => {
                    inner.sessions.remove(&device_id);
                    device_id
                }
                _ => return None,
            }
        };

        tracing::info!(device_id = %device_id, %handle, "session unregistered");
        self.emit(RegistryEvent::Unregistered {
            device_id: device_id.clone(),
        });
        Some(device_id)
    }

    /// Update the availability of a registered gateway. Returns `false` when
    /// the gateway has no session.
    pub async fn set_status(&self, device_id: &str, status: SessionStatus) -> bool {
        let changed = {
            let mut inner = self.inner.write().await;
            match inner.sessions.get_mut(device_id) {
                Some(session) if session.status != status => {
                    session.status = status;
                    true
                }
                Some(_) => return true,
                None => return false,
            }
        };

        if changed {
            self.emit(RegistryEvent::StatusChanged {
                device_id: device_id.to_string(),
                status,
            });
        }
        true
    }

    /// Whether a gateway currently counts as online.
    pub async fn is_online(&self, device_id: &str) -> bool {
        self.inner
            .read()
            .await
            .sessions
            .get(device_id)
            .map(|s| s.status.is_online())
            .unwrap_or(false)
    }

    /// Copy-on-read liveness snapshot of every registered session.
    pub async fn statuses(&self) -> Vec<SessionSnapshot> {
        self.inner
            .read()
            .await
            .sessions
            .values()
            .map(SessionSnapshot::from)
            .collect()
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Whether no sessions are registered.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sessions.is_empty()
    }

    /// Subscribe to registry change events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
