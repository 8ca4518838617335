//! Message-list channels: a bounded, append-only in-memory history.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use relay_common::SnowflakeGenerator;

use crate::gateway::events::ClientMessage;

pub struct MessageListChannel {
    history: Mutex<VecDeque<Value>>,
    limit: usize,
    snowflake: Arc<SnowflakeGenerator>,
}

impl MessageListChannel {
    pub fn new(limit: usize, snowflake: Arc<SnowflakeGenerator>) -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
            limit,
            snowflake,
        }
    }

    /// The buffered history as a JSON array, oldest first.
    pub fn history(&self) -> Value {
        Value::Array(self.history.lock().iter().cloned().collect())
    }

    /// Build the store payload for a `publish`, stamped with a snowflake id.
    pub fn publish_payload(&self, message: &ClientMessage) -> Value {
        let mut payload = message.to_json();
        payload["id"] = Value::from(self.snowflake.generate());
        payload
    }

    /// Append an echoed publish, evicting the oldest entry over the bound.
    pub fn apply(&self, payload: &Value) {
        let mut history = self.history.lock();
        history.push_back(payload.clone());
        while history.len() > self.limit {
            history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(limit: usize) -> MessageListChannel {
        MessageListChannel::new(limit, Arc::new(SnowflakeGenerator::new(0)))
    }

    #[test]
    fn history_is_bounded() {
        let ch = channel(3);
        for i in 0..5 {
            ch.apply(&serde_json::json!({"op": "publish", "message": i}));
        }

        let history = ch.history();
        let entries = history.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["message"], 2);
        assert_eq!(entries[2]["message"], 4);
    }

    #[test]
    fn publish_payload_stamps_an_id() {
        let ch = channel(10);
        let msg: ClientMessage = serde_json::from_str(
            r#"{"op":"publish","to":"message:/a/chat","message":"hello"}"#,
        )
        .unwrap();

        let a = ch.publish_payload(&msg);
        let b = ch.publish_payload(&msg);
        assert!(a["id"].is_i64());
        assert_ne!(a["id"], b["id"]);
        assert_eq!(a["message"], "hello");
    }
}
