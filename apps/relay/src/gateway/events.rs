//! Wire-format messages exchanged with clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A structured message received from a client.
///
/// `op` and `to` are required by the protocol but parsed leniently — a frame
/// with either missing still deserializes and is rejected by the dispatcher's
/// shape check instead of surfacing a parse error. Operation-specific fields
/// (`key`, `value`, `message`, …) are preserved in `rest` and travel with the
/// message, including across nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub to: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ack: bool,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ClientMessage {
    /// Operation-specific field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.rest.get(name)
    }

    /// The `key` field, for status/presence operations.
    pub fn key(&self) -> Option<&str> {
        self.field("key").and_then(Value::as_str)
    }

    /// The `value` field, for set operations.
    pub fn value(&self) -> Option<&Value> {
        self.field("value")
    }

    /// The whole message as a JSON value (the form resources publish).
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Server → Client messages
// ---------------------------------------------------------------------------

/// The initial frame sent once per connection, before any client traffic.
pub fn hello(instance: &str, cid: &str) -> Value {
    serde_json::json!({ "server": instance, "cid": cid })
}

/// Error reply sent when an authorization predicate denies an operation.
pub fn auth_error() -> Value {
    serde_json::json!({ "op": "err", "value": "auth" })
}

/// Acknowledgment reply for an operation that requested one.
pub fn ack(to: &str, op: &str) -> Value {
    serde_json::json!({ "op": "ack", "to": to, "value": op })
}

/// Reply carrying a resource's current state (`get`/`sync`).
pub fn state_reply(op: &str, to: &str, value: Value) -> Value {
    serde_json::json!({ "op": op, "to": to, "value": value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_fields_are_preserved() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"op":"set","to":"status:/a/b","key":"k","value":42}"#)
                .unwrap();
        assert_eq!(msg.op, "set");
        assert_eq!(msg.key(), Some("k"));
        assert_eq!(msg.value(), Some(&serde_json::json!(42)));

        let round = msg.to_json();
        assert_eq!(round["key"], "k");
        assert_eq!(round["value"], 42);
    }

    #[test]
    fn missing_op_and_to_default_to_empty() {
        let msg: ClientMessage = serde_json::from_str(r#"{"value":1}"#).unwrap();
        assert!(msg.op.is_empty());
        assert!(msg.to.is_empty());
        assert!(!msg.ack);
    }

    #[test]
    fn ack_false_is_not_serialized() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"op":"subscribe","to":"status:/a/b"}"#).unwrap();
        let json = msg.to_json();
        assert!(json.get("ack").is_none());
    }
}
