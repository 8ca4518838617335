//! Presence channels: who is online, keyed by a client-supplied identity.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde_json::Value;

use crate::gateway::client::ClientHandle;
use crate::gateway::events::ClientMessage;

pub struct PresenceChannel {
    /// Identities currently online (replicated across nodes via the store).
    online: Mutex<HashSet<String>>,
    /// Identities declared online by clients connected to THIS node, keyed by
    /// connection id, so a disconnect can publish the implicit offline.
    local: Mutex<HashMap<String, String>>,
}

impl PresenceChannel {
    pub fn new() -> Self {
        Self {
            online: Mutex::new(HashSet::new()),
            local: Mutex::new(HashMap::new()),
        }
    }

    /// The online set as a JSON object of `identity → "online"`.
    pub fn snapshot(&self) -> Value {
        let online = self.online.lock();
        Value::Object(
            online
                .iter()
                .map(|id| (id.clone(), Value::String("online".to_string())))
                .collect(),
        )
    }

    /// Build the store payload for a `set`. `value` must be `"online"` or
    /// `"offline"`; the identity defaults to the connection id when no `key`
    /// is given.
    pub fn set_payload(&self, client: &ClientHandle, message: &ClientMessage) -> Option<Value> {
        let status = message.value().and_then(Value::as_str)?;
        if status != "online" && status != "offline" {
            return None;
        }
        let identity = message.key().unwrap_or(&client.id).to_string();
        if status == "online" {
            self.local
                .lock()
                .insert(client.id.clone(), identity.clone());
        } else {
            self.local.lock().remove(&client.id);
        }
        let mut payload = message.to_json();
        payload["key"] = Value::String(identity);
        Some(payload)
    }

    /// Forget the identity a departing connection declared online, if any.
    pub fn take_local(&self, client_id: &str) -> Option<String> {
        self.local.lock().remove(client_id)
    }

    /// Apply an echoed online/offline transition.
    pub fn apply(&self, payload: &Value) {
        if payload.get("op").and_then(Value::as_str) != Some("set") {
            return;
        }
        let Some(identity) = payload.get("key").and_then(Value::as_str) else {
            return;
        };
        match payload.get("value").and_then(Value::as_str) {
            Some("online") => {
                self.online.lock().insert(identity.to_string());
            }
            Some("offline") => {
                self.online.lock().remove(identity);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn client(id: &str) -> ClientHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        ClientHandle::new(id.to_string(), tx)
    }

    #[test]
    fn online_offline_round_trip() {
        let ch = PresenceChannel::new();
        ch.apply(&serde_json::json!({"op": "set", "key": "alice", "value": "online"}));
        assert_eq!(ch.snapshot()["alice"], "online");

        ch.apply(&serde_json::json!({"op": "set", "key": "alice", "value": "offline"}));
        assert!(ch.snapshot().get("alice").is_none());
    }

    #[test]
    fn set_payload_defaults_identity_to_connection_id() {
        let ch = PresenceChannel::new();
        let c = client("cli_1");
        let msg: ClientMessage =
            serde_json::from_str(r#"{"op":"set","to":"presence:/a/r","value":"online"}"#)
                .unwrap();

        let payload = ch.set_payload(&c, &msg).unwrap();
        assert_eq!(payload["key"], "cli_1");
        assert_eq!(ch.take_local("cli_1"), Some("cli_1".to_string()));
    }

    #[test]
    fn set_payload_rejects_unknown_status() {
        let ch = PresenceChannel::new();
        let c = client("cli_1");
        let msg: ClientMessage =
            serde_json::from_str(r#"{"op":"set","to":"presence:/a/r","value":"away"}"#).unwrap();
        assert!(ch.set_payload(&c, &msg).is_none());
    }

    #[test]
    fn offline_set_clears_local_tracking() {
        let ch = PresenceChannel::new();
        let c = client("cli_1");
        let online: ClientMessage = serde_json::from_str(
            r#"{"op":"set","to":"presence:/a/r","key":"alice","value":"online"}"#,
        )
        .unwrap();
        let offline: ClientMessage = serde_json::from_str(
            r#"{"op":"set","to":"presence:/a/r","key":"alice","value":"offline"}"#,
        )
        .unwrap();

        ch.set_payload(&c, &online).unwrap();
        ch.set_payload(&c, &offline).unwrap();
        assert!(ch.take_local("cli_1").is_none());
    }
}
