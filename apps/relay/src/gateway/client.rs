//! Per-connection client handle: identity plus a send capability.

use serde_json::Value;
use tokio::sync::mpsc;

/// A connected client as the rest of the broker sees it.
///
/// Cheap to clone; resources keep clones in their subscriber sets. Frames
/// pushed through `send` are queued on the connection's outbound channel and
/// written by the connection task. Sends to a closed connection are dropped.
#[derive(Clone)]
pub struct ClientHandle {
    /// Connection identifier (`cli_` prefixed ULID).
    pub id: String,
    tx: mpsc::UnboundedSender<String>,
}

impl ClientHandle {
    pub fn new(id: String, tx: mpsc::UnboundedSender<String>) -> Self {
        Self { id, tx }
    }

    /// Queue a structured message for delivery to this client.
    pub fn send(&self, message: &Value) {
        self.send_raw(message.to_string());
    }

    /// Queue an already-serialized frame for delivery to this client.
    pub fn send_raw(&self, frame: String) {
        if self.tx.send(frame).is_err() {
            tracing::debug!(cid = %self.id, "dropping frame for closed connection");
        }
    }
}
