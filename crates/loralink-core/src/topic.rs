//! MQTT topic grammar.
//!
//! The topic layout is fixed for interop with deployed gateways:
//!
//! - `gateway/{device_id}/command`: control plane to gateway
//! - `gateway/{device_id}/response`: gateway replies
//! - `gateway/{device_id}/status`: gateway liveness announcements (retained)
//! - `sensor_data/{gateway_id}/{node_id}`: node telemetry (read-only)
//!
//! Subscriptions use single-level wildcards so one subscription covers the
//! whole fleet instead of churning per-device subscriptions.

/// Wildcard filter covering every gateway's response topic.
pub const RESPONSE_FILTER: &str = "gateway/+/response";

/// Wildcard filter covering every gateway's status topic.
pub const STATUS_FILTER: &str = "gateway/+/status";

/// Wildcard filter covering all sensor telemetry.
pub const SENSOR_FILTER: &str = "sensor_data/+/+";

/// Command topic for one gateway.
pub fn command_topic(device_id: &str) -> String {
    format!("gateway/{}/command", device_id)
}

/// Response topic for one gateway.
pub fn response_topic(device_id: &str) -> String {
    format!("gateway/{}/response", device_id)
}

/// Status topic for one gateway.
pub fn status_topic(device_id: &str) -> String {
    format!("gateway/{}/status", device_id)
}

/// Telemetry topic for one node behind a gateway.
pub fn sensor_topic(gateway_id: &str, node_id: &str) -> String {
    format!("sensor_data/{}/{}", gateway_id, node_id)
}

/// Extract the device id from a `gateway/{id}/...` topic.
pub fn gateway_from_topic(topic: &str) -> Option<&str> {
    let mut parts = topic.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("gateway"), Some(id), Some(_)) if !id.is_empty() => Some(id),
        _ => None,
    }
}

/// Extract `(gateway_id, node_id)` from a `sensor_data/{gw}/{node}` topic.
pub fn sensor_from_topic(topic: &str) -> Option<(&str, &str)> {
    let mut parts = topic.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("sensor_data"), Some(gw), Some(node), None) if !gw.is_empty() && !node.is_empty() => {
            Some((gw, node))
        }
        _ => None,
    }
}

/// Check whether `topic` matches `filter`.
///
/// `+` matches exactly one level, `#` matches the remainder of the topic and
/// is only valid as the final level.
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_builders() {
        assert_eq!(command_topic("G1"), "gateway/G1/command");
        assert_eq!(response_topic("G1"), "gateway/G1/response");
        assert_eq!(status_topic("G100101"), "gateway/G100101/status");
        assert_eq!(sensor_topic("G1", "N7"), "sensor_data/G1/N7");
    }

    #[test]
    fn gateway_extraction() {
        assert_eq!(gateway_from_topic("gateway/G1/response"), Some("G1"));
        assert_eq!(gateway_from_topic("gateway/G1/status"), Some("G1"));
        assert_eq!(gateway_from_topic("sensor_data/G1/N1"), None);
        assert_eq!(gateway_from_topic("gateway//response"), None);
        assert_eq!(gateway_from_topic("gateway/G1"), None);
    }

    #[test]
    fn sensor_extraction() {
        assert_eq!(sensor_from_topic("sensor_data/G1/N7"), Some(("G1", "N7")));
        assert_eq!(sensor_from_topic("sensor_data/G1"), None);
        assert_eq!(sensor_from_topic("sensor_data/G1/N7/extra"), None);
        assert_eq!(sensor_from_topic("gateway/G1/status"), None);
    }

    #[test]
    fn single_level_wildcard() {
        assert!(matches(RESPONSE_FILTER, "gateway/G1/response"));
        assert!(matches(RESPONSE_FILTER, "gateway/anything/response"));
        assert!(!matches(RESPONSE_FILTER, "gateway/G1/command"));
        assert!(!matches(RESPONSE_FILTER, "gateway/G1/a/response"));
        assert!(!matches(RESPONSE_FILTER, "gateway/G1"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(matches("#", "gateway/G1/response"));
        assert!(matches("gateway/#", "gateway/G1/response"));
        assert!(matches("gateway/#", "gateway/G1"));
        assert!(!matches("sensor_data/#", "gateway/G1/status"));
    }

    #[test]
    fn exact_match() {
        assert!(matches("gateway/G1/command", "gateway/G1/command"));
        assert!(!matches("gateway/G1/command", "gateway/G2/command"));
    }
}
