//! Sensor telemetry collector.
//!
//! Gateways relay node readings on `sensor_data/{gateway_id}/{node_id}`.
//! The collector keeps the latest reading per node and fans every reading out
//! on a broadcast channel. Read-only and entirely outside the command path;
//! nothing is persisted here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use loralink_core::topic;
use loralink_transport::{HandlerError, MessageHandler, SubscribeError, Transport};

const EVENT_CAPACITY: usize = 256;

/// One telemetry reading relayed by a gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    /// Gateway that relayed the reading.
    pub gateway_id: String,
    /// Node the reading came from.
    pub node_id: String,
    /// Sensor values, opaque to the control plane.
    pub sensor_data: serde_json::Value,
    /// When the gateway published the reading.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Collects `sensor_data/+/+` readings.
pub struct TelemetryCollector {
    latest: RwLock<HashMap<(String, String), SensorReading>>,
    events: broadcast::Sender<SensorReading>,
    received: AtomicU64,
    malformed: AtomicU64,
}

impl TelemetryCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            latest: RwLock::new(HashMap::new()),
            events,
            received: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
        }
    }

    /// Subscribe this collector on the transport.
    pub async fn attach<T: Transport + ?Sized>(
        self: Arc<Self>,
        transport: &T,
    ) -> Result<(), SubscribeError> {
        transport.subscribe(topic::SENSOR_FILTER, self).await
    }

    /// Subscribe to the stream of readings.
    pub fn subscribe(&self) -> broadcast::Receiver<SensorReading> {
        self.events.subscribe()
    }

    /// Latest reading for one node, if any has been seen.
    pub async fn latest(&self, gateway_id: &str, node_id: &str) -> Option<SensorReading> {
        self.latest
            .read()
            .await
            .get(&(gateway_id.to_string(), node_id.to_string()))
            .cloned()
    }

    /// Latest reading of every node behind one gateway.
    pub async fn latest_for_gateway(&self, gateway_id: &str) -> Vec<SensorReading> {
        self.latest
            .read()
            .await
            .iter()
            .filter(|((gw, _), _)| gw == gateway_id)
            .map(|(_, reading)| reading.clone())
            .collect()
    }

    /// Total readings accepted.
    pub fn readings_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Total payloads dropped as malformed.
    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageHandler for TelemetryCollector {
    fn name(&self) -> &'static str {
        "telemetry-collector"
    }

    async fn on_message(&self, topic: &str, payload: &[u8]) -> Result<(), HandlerError> {
        let Some((gateway_id, node_id)) = topic::sensor_from_topic(topic) else {
            self.malformed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        let mut reading: SensorReading = match serde_json::from_slice(payload) {
            Ok(r) => r,
            Err(e) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(gateway_id, node_id, "dropping malformed telemetry: {e}");
                return Ok(());
            }
        };

        // The topic segments are authoritative over whatever ids the payload
        // claims.
        reading.gateway_id = gateway_id.to_string();
        reading.node_id = node_id.to_string();

        self.received.fetch_add(1, Ordering::Relaxed);

        self.latest
            .write()
            .await
            .insert((reading.gateway_id.clone(), reading.node_id.clone()), reading.clone());

        // No subscribers is fine.
        let _ = self.events.send(reading);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reading_payload(temp: f64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "gateway_id": "G1",
            "node_id": "N7",
            "sensor_data": { "temperature": temp, "humidity": 40 },
            "timestamp": "2024-03-01T10:00:00Z"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn reading_updates_cache_and_stream() {
        let collector = TelemetryCollector::new();
        let mut stream = collector.subscribe();

        collector
            .on_message("sensor_data/G1/N7", &reading_payload(21.5))
            .await
            .unwrap();

        let cached = collector.latest("G1", "N7").await.unwrap();
        assert_eq!(cached.sensor_data["temperature"], json!(21.5));

        let streamed = stream.try_recv().unwrap();
        assert_eq!(streamed.node_id, "N7");
        assert_eq!(collector.readings_received(), 1);
    }

    #[tokio::test]
    async fn newer_reading_replaces_older() {
        let collector = TelemetryCollector::new();

        collector
            .on_message("sensor_data/G1/N7", &reading_payload(20.0))
            .await
            .unwrap();
        collector
            .on_message("sensor_data/G1/N7", &reading_payload(25.0))
            .await
            .unwrap();

        let cached = collector.latest("G1", "N7").await.unwrap();
        assert_eq!(cached.sensor_data["temperature"], json!(25.0));
        assert_eq!(collector.latest_for_gateway("G1").await.len(), 1);
    }

    #[tokio::test]
    async fn topic_ids_win_over_payload_ids() {
        let collector = TelemetryCollector::new();

        // Payload claims G1/N7 but arrives on G2/N9.
        collector
            .on_message("sensor_data/G2/N9", &reading_payload(19.0))
            .await
            .unwrap();

        assert!(collector.latest("G1", "N7").await.is_none());
        let cached = collector.latest("G2", "N9").await.unwrap();
        assert_eq!(cached.gateway_id, "G2");
        assert_eq!(cached.node_id, "N9");
    }

    #[tokio::test]
    async fn malformed_telemetry_is_dropped() {
        let collector = TelemetryCollector::new();

        collector
            .on_message("sensor_data/G1/N7", b"\xff\xfe")
            .await
            .unwrap();
        collector
            .on_message("sensor_data/G1/N7", br#"{"unexpected":"shape"}"#)
            .await
            .unwrap();

        assert_eq!(collector.malformed_count(), 2);
        assert_eq!(collector.readings_received(), 0);
        assert!(collector.latest("G1", "N7").await.is_none());
    }
}
