//! Broker-level event hub for process-local listeners.
//!
//! Uses a single `tokio::sync::broadcast` channel. Every dispatched client
//! message produces at most one event here, named after its `op` and gated on
//! the target resource's subscribe acknowledgment.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::client::ClientHandle;
use super::events::ClientMessage;

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip events (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

/// A post-dispatch notification for one client message.
#[derive(Debug, Clone)]
pub struct BrokerEvent {
    /// The operation name the event is named after.
    pub op: String,
    /// The originating client's connection id.
    pub client_id: String,
    /// The message as dispatched.
    pub message: ClientMessage,
}

/// The global event hub. Cloneable — store in AppState.
#[derive(Clone)]
pub struct BrokerEvents {
    sender: broadcast::Sender<Arc<BrokerEvent>>,
}

impl BrokerEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Subscribe to broker events. Each listener gets its own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BrokerEvent>> {
        self.sender.subscribe()
    }

    /// Emit an event to all listeners.
    pub fn emit(&self, op: &str, client: &ClientHandle, message: &ClientMessage) {
        tracing::debug!(op, cid = %client.id, "emitting broker event");
        // send() returns Err if there are no receivers — that's fine.
        let _ = self.sender.send(Arc::new(BrokerEvent {
            op: op.to_string(),
            client_id: client.id.clone(),
            message: message.clone(),
        }));
    }
}

impl Default for BrokerEvents {
    fn default() -> Self {
        Self::new()
    }
}
