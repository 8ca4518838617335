//! Status channels: a per-channel map of `key → value`.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use crate::gateway::events::ClientMessage;

pub struct StatusChannel {
    values: Mutex<HashMap<String, Value>>,
}

impl StatusChannel {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
        }
    }

    /// The current map as a JSON object.
    pub fn snapshot(&self) -> Value {
        let values = self.values.lock();
        Value::Object(values.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Build the store payload for a `set`. Requires `key` and `value`.
    pub fn set_payload(&self, message: &ClientMessage) -> Option<Value> {
        message.key()?;
        message.value()?;
        Some(message.to_json())
    }

    /// Apply an echoed `set`.
    pub fn apply(&self, payload: &Value) {
        if payload.get("op").and_then(Value::as_str) != Some("set") {
            return;
        }
        let Some(key) = payload.get("key").and_then(Value::as_str) else {
            return;
        };
        let Some(value) = payload.get("value") else {
            return;
        };
        self.values.lock().insert(key.to_string(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_set_updates_snapshot() {
        let ch = StatusChannel::new();
        ch.apply(&serde_json::json!({"op": "set", "key": "alice", "value": "away"}));
        ch.apply(&serde_json::json!({"op": "set", "key": "bob", "value": 3}));

        let snap = ch.snapshot();
        assert_eq!(snap["alice"], "away");
        assert_eq!(snap["bob"], 3);
    }

    #[test]
    fn apply_ignores_non_set_and_malformed_payloads() {
        let ch = StatusChannel::new();
        ch.apply(&serde_json::json!({"op": "publish", "key": "a", "value": 1}));
        ch.apply(&serde_json::json!({"op": "set", "value": 1}));
        ch.apply(&serde_json::json!({"op": "set", "key": "a"}));

        assert_eq!(ch.snapshot(), serde_json::json!({}));
    }

    #[test]
    fn set_payload_requires_key_and_value() {
        let ch = StatusChannel::new();
        let ok: ClientMessage =
            serde_json::from_str(r#"{"op":"set","to":"status:/a/b","key":"k","value":1}"#)
                .unwrap();
        assert!(ch.set_payload(&ok).is_some());

        let missing: ClientMessage =
            serde_json::from_str(r#"{"op":"set","to":"status:/a/b","key":"k"}"#).unwrap();
        assert!(ch.set_payload(&missing).is_none());
    }
}
