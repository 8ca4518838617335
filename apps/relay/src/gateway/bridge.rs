//! Cross-node store bridge.
//!
//! Abstraction over the shared pub/sub store that links relay nodes together.
//! Backed by redis in production and an in-memory loopback in tests. Inbound
//! store traffic is funneled through one channel and routed to the owning
//! resource by the router task.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::registry::ResourceRegistry;

/// Error raised by store operations.
#[derive(Debug)]
pub struct BridgeError {
    message: String,
}

impl BridgeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store bridge error: {}", self.message)
    }
}

impl std::error::Error for BridgeError {}

impl From<redis::RedisError> for BridgeError {
    fn from(err: redis::RedisError) -> Self {
        Self::new(err.to_string())
    }
}

/// The contract the broker core needs from the cross-node store.
///
/// `subscribe` resolves when the store has acknowledged the subscription;
/// resources are not considered ready before that point. Inbound messages
/// arrive on the channel handed out at construction time.
#[async_trait]
pub trait StoreBridge: Send + Sync {
    async fn subscribe(&self, name: &str) -> Result<(), BridgeError>;
    async fn unsubscribe(&self, name: &str) -> Result<(), BridgeError>;
    async fn publish(&self, name: &str, payload: String) -> Result<(), BridgeError>;
}

// ---------------------------------------------------------------------------
// Redis implementation
// ---------------------------------------------------------------------------

/// Redis-backed bridge: a split pub/sub connection for subscriptions and a
/// managed connection for publishing (pub/sub connections cannot issue
/// PUBLISH themselves).
pub struct RedisBridge {
    sink: tokio::sync::Mutex<redis::aio::PubSubSink>,
    publisher: redis::aio::ConnectionManager,
}

impl RedisBridge {
    /// Connect to redis and start the pub/sub reader. Returns the bridge and
    /// the channel inbound `(name, payload)` messages arrive on.
    pub async fn connect(
        redis_url: &str,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<(String, String)>), BridgeError> {
        let client = redis::Client::open(redis_url)?;
        let publisher = client.get_connection_manager().await?;
        let pubsub = client.get_async_pubsub().await?;
        let (sink, mut stream) = pubsub.split();

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let name = msg.get_channel_name().to_string();
                match msg.get_payload::<String>() {
                    Ok(payload) => {
                        if tx.send((name, payload)).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%name, %err, "unreadable store payload, discarding");
                    }
                }
            }
            tracing::warn!("store pub/sub stream ended");
        });

        Ok((
            Arc::new(Self {
                sink: tokio::sync::Mutex::new(sink),
                publisher,
            }),
            rx,
        ))
    }
}

#[async_trait]
impl StoreBridge for RedisBridge {
    async fn subscribe(&self, name: &str) -> Result<(), BridgeError> {
        self.sink.lock().await.subscribe(name).await?;
        Ok(())
    }

    async fn unsubscribe(&self, name: &str) -> Result<(), BridgeError> {
        self.sink.lock().await.unsubscribe(name).await?;
        Ok(())
    }

    async fn publish(&self, name: &str, payload: String) -> Result<(), BridgeError> {
        let mut conn = self.publisher.clone();
        let _: () = redis::AsyncCommands::publish(&mut conn, name, payload).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (single-node dev / tests)
// ---------------------------------------------------------------------------

/// Loopback bridge: publishes echo straight back to the inbound channel, the
/// way a single-node redis deployment would. Subscribe acknowledgments can be
/// held and released to exercise the in-flight-subscription paths.
pub struct MemoryBridge {
    subscribed: Mutex<HashSet<String>>,
    subscribe_calls: Mutex<Vec<String>>,
    unsubscribe_calls: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, String)>>,
    inbound: mpsc::UnboundedSender<(String, String)>,
    acks_open: watch::Sender<bool>,
}

impl MemoryBridge {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (acks_open, _) = watch::channel(true);
        (
            Arc::new(Self {
                subscribed: Mutex::new(HashSet::new()),
                subscribe_calls: Mutex::new(Vec::new()),
                unsubscribe_calls: Mutex::new(Vec::new()),
                published: Mutex::new(Vec::new()),
                inbound: tx,
                acks_open,
            }),
            rx,
        )
    }

    /// Park subsequent subscribe calls until `release_acks`.
    pub fn hold_acks(&self) {
        self.acks_open.send_replace(false);
    }

    /// Release every held subscribe call.
    pub fn release_acks(&self) {
        self.acks_open.send_replace(true);
    }

    /// Inject an inbound store message, as if another node published it.
    pub fn inject(&self, name: &str, payload: &str) {
        let _ = self.inbound.send((name.to_string(), payload.to_string()));
    }

    /// Number of subscribe requests issued for `name`.
    pub fn subscribe_count(&self, name: &str) -> usize {
        self.subscribe_calls
            .lock()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    /// Number of unsubscribe requests issued for `name`.
    pub fn unsubscribe_count(&self, name: &str) -> usize {
        self.unsubscribe_calls
            .lock()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    /// Everything published through this bridge, in order.
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl StoreBridge for MemoryBridge {
    async fn subscribe(&self, name: &str) -> Result<(), BridgeError> {
        self.subscribe_calls.lock().push(name.to_string());
        let mut acks = self.acks_open.subscribe();
        acks.wait_for(|open| *open)
            .await
            .map_err(|_| BridgeError::new("bridge closed"))?;
        self.subscribed.lock().insert(name.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, name: &str) -> Result<(), BridgeError> {
        self.unsubscribe_calls.lock().push(name.to_string());
        self.subscribed.lock().remove(name);
        Ok(())
    }

    async fn publish(&self, name: &str, payload: String) -> Result<(), BridgeError> {
        self.published
            .lock()
            .push((name.to_string(), payload.clone()));
        // Echo to local subscribers, like redis does for the publishing node.
        if self.subscribed.lock().contains(name) {
            let _ = self.inbound.send((name.to_string(), payload));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Inbound routing
// ---------------------------------------------------------------------------

/// Route inbound store traffic to resources until the channel closes. The
/// handle is owned by the broker state and aborted at shutdown.
pub fn spawn_inbound_router(
    registry: Arc<ResourceRegistry>,
    mut inbound: mpsc::UnboundedReceiver<(String, String)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((name, payload)) = inbound.recv().await {
            route_inbound(&registry, &name, &payload);
        }
        tracing::debug!("store inbound channel closed");
    })
}

fn route_inbound(registry: &ResourceRegistry, name: &str, payload: &str) {
    tracing::debug!(%name, "store message in");
    let Some(resource) = registry.get(name) else {
        // Another node's traffic for a resource with no local interest, or a
        // race with local destruction.
        tracing::warn!(%name, "store message for unknown resource, discarding");
        return;
    };
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(err) => {
            tracing::error!(%name, %err, "corrupted store payload, discarding");
            return;
        }
    };
    resource.redis_in(value);
}
