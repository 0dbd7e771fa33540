//! Wire envelopes exchanged with field gateways.
//!
//! The JSON shapes here are consumed by firmware already in the field, so the
//! key spelling is fixed:
//!
//! ```text
//! Command:  { "correlation_id": "<id>", "action": "<ACTION>", "data": { ... } }
//! Response: { "correlation_id": "<id>", "response": { "success": bool, "message": "...", ... } }
//! ```

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::CorrelationId;

/// Action requested of a gateway.
///
/// An open set: the named variants are the actions the stock firmware
/// understands, but unknown strings round-trip untouched and the gateway
/// itself answers unrecognised actions with a failure response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Bind the gateway to an owning account.
    RegisterGateway,
    /// Release the gateway from its owning account.
    UnregisterGateway,
    /// Pair a sensor node with the gateway.
    EnrollNode,
    /// Unpair a sensor node from the gateway.
    UnenrollNode,
    /// Switch a node relay on or off.
    RelayControl,
    /// Any action outside the stock set, passed through verbatim.
    Other(String),
}

impl CommandAction {
    /// The wire spelling of this action.
    pub fn as_str(&self) -> &str {
        match self {
            CommandAction::RegisterGateway => "REGISTER_GATEWAY",
            CommandAction::UnregisterGateway => "UNREGISTER_GATEWAY",
            CommandAction::EnrollNode => "ENROLL_NODE",
            CommandAction::UnenrollNode => "UNENROLL_NODE",
            CommandAction::RelayControl => "RELAY_CONTROL",
            CommandAction::Other(s) => s,
        }
    }
}

impl From<&str> for CommandAction {
    fn from(s: &str) -> Self {
        match s {
            "REGISTER_GATEWAY" => CommandAction::RegisterGateway,
            "UNREGISTER_GATEWAY" => CommandAction::UnregisterGateway,
            "ENROLL_NODE" => CommandAction::EnrollNode,
            "UNENROLL_NODE" => CommandAction::UnenrollNode,
            "RELAY_CONTROL" => CommandAction::RelayControl,
            other => CommandAction::Other(other.to_string()),
        }
    }
}

impl From<String> for CommandAction {
    fn from(s: String) -> Self {
        CommandAction::from(s.as_str())
    }
}

impl std::fmt::Display for CommandAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for CommandAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CommandAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(CommandAction::from(s))
    }
}

/// Command published to `gateway/{device_id}/command`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Token the gateway must echo back in its response.
    pub correlation_id: CorrelationId,
    /// Requested action.
    pub action: CommandAction,
    /// Action-specific payload, opaque to the control plane.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl CommandEnvelope {
    /// Create a new command envelope.
    pub fn new(
        correlation_id: impl Into<CorrelationId>,
        action: CommandAction,
        data: serde_json::Value,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            action,
            data,
        }
    }
}

/// Response received on `gateway/{device_id}/response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Token echoed from the command this answers.
    pub correlation_id: CorrelationId,
    /// The gateway's verdict and payload.
    pub response: ResponseBody,
}

/// The inner `response` object of a [`ResponseEnvelope`].
///
/// Beyond `success` and `message` the gateway is free to attach arbitrary
/// fields; they are captured verbatim in [`ResponseBody::extra`] so callers
/// see exactly what the device sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseBody {
    /// Whether the gateway executed the command.
    pub success: bool,
    /// Human-readable outcome description.
    #[serde(default)]
    pub message: String,
    /// Any additional fields the gateway attached.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ResponseBody {
    /// A successful response with a message and no extra payload.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// A failure response carrying the gateway's error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Attach an extra payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Look up an extra payload field by name.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_wire_spelling() {
        assert_eq!(CommandAction::RegisterGateway.as_str(), "REGISTER_GATEWAY");
        assert_eq!(CommandAction::RelayControl.as_str(), "RELAY_CONTROL");
        assert_eq!(
            CommandAction::from("ENROLL_NODE"),
            CommandAction::EnrollNode
        );
    }

    #[test]
    fn action_open_set_round_trip() {
        let action = CommandAction::from("REBOOT");
        assert_eq!(action, CommandAction::Other("REBOOT".to_string()));

        let serialized = serde_json::to_string(&action).unwrap();
        assert_eq!(serialized, "\"REBOOT\"");

        let back: CommandAction = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn command_wire_shape_is_exact() {
        let envelope = CommandEnvelope::new(
            "42",
            CommandAction::EnrollNode,
            json!({ "node_id": "N7" }),
        );

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "correlation_id": "42",
                "action": "ENROLL_NODE",
                "data": { "node_id": "N7" }
            })
        );
    }

    #[test]
    fn response_extra_fields_are_preserved() {
        let raw = r#"{"correlation_id":"42","response":{"success":true,"message":"ok","foo":1}}"#;
        let envelope: ResponseEnvelope = serde_json::from_str(raw).unwrap();

        assert_eq!(envelope.correlation_id, "42");
        assert!(envelope.response.success);
        assert_eq!(envelope.response.message, "ok");
        assert_eq!(envelope.response.get("foo"), Some(&json!(1)));
    }

    #[test]
    fn response_message_defaults_to_empty() {
        let raw = r#"{"correlation_id":"9","response":{"success":false}}"#;
        let envelope: ResponseEnvelope = serde_json::from_str(raw).unwrap();
        assert!(!envelope.response.success);
        assert!(envelope.response.message.is_empty());
    }

    #[test]
    fn response_builder_round_trip() {
        let body = ResponseBody::ok("done").with_field("relay1_state", json!("1"));
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({ "success": true, "message": "done", "relay1_state": "1" })
        );
    }
}
