//! Resource (channel) objects: typed, shared, subscribable units of state.
//!
//! A resource name encodes its type by prefix (`status:`, `presence:`,
//! `message:`). Each type exposes the same capability surface to the
//! dispatcher; operations a type does not support are explicit no-ops.
//! Mutations are published through the store bridge and applied on the echo
//! path (`redis_in`), so local and remote writers share one code path.

pub mod message_list;
pub mod presence;
pub mod status;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use relay_common::SnowflakeGenerator;

use crate::config::Config;

use super::bridge::StoreBridge;
use super::client::ClientHandle;
use super::events::{self, ClientMessage};

use message_list::MessageListChannel;
use presence::PresenceChannel;
use status::StatusChannel;

/// Callback invoked once the resource's store subscription is acknowledged.
pub type ReadyCallback = Box<dyn FnOnce() + Send + 'static>;

/// Authorization predicate evaluated before any operation on the resource.
pub type AuthPredicate = Arc<dyn Fn(&ClientMessage, &ClientHandle) -> bool + Send + Sync>;

/// Resource type classification, parsed from the name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Status,
    Presence,
    MessageList,
}

impl ResourceType {
    /// Classify a resource name. Unclassifiable names yield `None` and no
    /// resource is ever created for them.
    pub fn classify(name: &str) -> Option<Self> {
        let (prefix, rest) = name.split_once(':')?;
        if rest.is_empty() {
            return None;
        }
        match prefix {
            "status" => Some(Self::Status),
            "presence" => Some(Self::Presence),
            "message" => Some(Self::MessageList),
            _ => None,
        }
    }
}

/// Per-type options applied when a resource is created.
#[derive(Clone, Default)]
pub struct ResourceOptions {
    /// Authorization predicate; `None` means open access.
    pub auth: Option<AuthPredicate>,
}

/// Per-type configuration table, fixed at attach time.
pub struct ResourceTypes {
    pub status: ResourceOptions,
    pub presence: ResourceOptions,
    pub message: ResourceOptions,
    pub history_limit: usize,
    pub snowflake: Arc<SnowflakeGenerator>,
}

impl ResourceTypes {
    pub fn from_config(config: &Config) -> Self {
        Self {
            status: ResourceOptions::default(),
            presence: ResourceOptions::default(),
            message: ResourceOptions::default(),
            history_limit: config.message_history_limit,
            snowflake: Arc::new(SnowflakeGenerator::new(0)),
        }
    }

    pub fn options_for(&self, rtype: ResourceType) -> ResourceOptions {
        match rtype {
            ResourceType::Status => self.status.clone(),
            ResourceType::Presence => self.presence.clone(),
            ResourceType::MessageList => self.message.clone(),
        }
    }
}

/// Type-specific state.
pub enum ResourceKind {
    Status(StatusChannel),
    Presence(PresenceChannel),
    MessageList(MessageListChannel),
}

struct SubscribeState {
    acknowledged: bool,
    requested_at: Instant,
    latency: Option<Duration>,
    pending: Vec<ReadyCallback>,
}

/// A named channel shared by all of its subscribers. At most one object
/// exists per name within a process; lifetime is governed by the registry.
pub struct Resource {
    pub name: String,
    pub kind: ResourceKind,
    pub options: ResourceOptions,
    bridge: Arc<dyn StoreBridge>,
    subscribers: Mutex<HashMap<String, ClientHandle>>,
    sub_state: Mutex<SubscribeState>,
}

impl Resource {
    pub fn new(
        name: &str,
        rtype: ResourceType,
        types: &ResourceTypes,
        bridge: Arc<dyn StoreBridge>,
    ) -> Self {
        let kind = match rtype {
            ResourceType::Status => ResourceKind::Status(StatusChannel::new()),
            ResourceType::Presence => ResourceKind::Presence(PresenceChannel::new()),
            ResourceType::MessageList => ResourceKind::MessageList(MessageListChannel::new(
                types.history_limit,
                types.snowflake.clone(),
            )),
        };
        Self {
            name: name.to_string(),
            kind,
            options: types.options_for(rtype),
            bridge,
            subscribers: Mutex::new(HashMap::new()),
            sub_state: Mutex::new(SubscribeState {
                acknowledged: false,
                requested_at: Instant::now(),
                latency: None,
                pending: Vec::new(),
            }),
        }
    }

    // -- subscription readiness (driven by the registry) --------------------

    /// Run `on_ready` now if the store subscription is acknowledged (the
    /// callback is handed back for the caller to invoke outside the lock);
    /// otherwise queue it for the acknowledgment.
    pub(crate) fn when_ready(&self, on_ready: ReadyCallback) -> Option<ReadyCallback> {
        let mut state = self.sub_state.lock();
        if state.acknowledged {
            Some(on_ready)
        } else {
            state.pending.push(on_ready);
            None
        }
    }

    /// Mark the store subscription acknowledged. Returns the measured
    /// subscribe latency and every queued ready callback.
    pub(crate) fn note_ready(&self) -> (Duration, Vec<ReadyCallback>) {
        let mut state = self.sub_state.lock();
        state.acknowledged = true;
        let latency = state.requested_at.elapsed();
        state.latency = Some(latency);
        (latency, std::mem::take(&mut state.pending))
    }

    pub fn is_acknowledged(&self) -> bool {
        self.sub_state.lock().acknowledged
    }

    pub fn subscribe_latency(&self) -> Option<Duration> {
        self.sub_state.lock().latency
    }

    // -- subscriber set -----------------------------------------------------

    pub fn subscribe(&self, client: &ClientHandle, ack: bool) {
        self.subscribers
            .lock()
            .insert(client.id.clone(), client.clone());
        tracing::debug!(resource = %self.name, cid = %client.id, "subscribed");
        if ack {
            client.send(&events::ack(&self.name, "subscribe"));
        }
    }

    /// Remove a client from the subscriber set. With `ack` disabled (the
    /// disconnect path) nothing is ever sent back.
    pub async fn unsubscribe(&self, client: &ClientHandle, ack: bool) {
        let removed = self.subscribers.lock().remove(&client.id).is_some();
        if removed {
            tracing::debug!(resource = %self.name, cid = %client.id, "unsubscribed");
        }
        if let ResourceKind::Presence(presence) = &self.kind {
            // A departing client that declared itself online goes offline.
            if let Some(identity) = presence.take_local(&client.id) {
                let payload = serde_json::json!({
                    "op": "set", "to": self.name, "key": identity, "value": "offline",
                });
                self.publish_to_store(payload).await;
            }
        }
        if ack {
            client.send(&events::ack(&self.name, "unsubscribe"));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_subscriber(&self, client_id: &str) -> bool {
        self.subscribers.lock().contains_key(client_id)
    }

    // -- operations ---------------------------------------------------------

    /// `get`: reply the current state. Returns false when the type does not
    /// support it.
    pub fn get_status(&self, client: &ClientHandle, _message: &ClientMessage) -> bool {
        let value = match &self.kind {
            ResourceKind::Status(ch) => ch.snapshot(),
            ResourceKind::Presence(ch) => ch.snapshot(),
            ResourceKind::MessageList(_) => return false,
        };
        client.send(&events::state_reply("get", &self.name, value));
        true
    }

    /// `set`: publish a mutation through the store; the echo path applies it
    /// and fans it out. Returns false when the type does not support it.
    pub async fn set_status(
        &self,
        client: &ClientHandle,
        message: &ClientMessage,
        ack: bool,
    ) -> bool {
        let payload = match &self.kind {
            ResourceKind::Status(ch) => ch.set_payload(message),
            ResourceKind::Presence(ch) => ch.set_payload(client, message),
            ResourceKind::MessageList(_) => return false,
        };
        let Some(payload) = payload else {
            tracing::warn!(resource = %self.name, cid = %client.id, "malformed set, dropping");
            return true;
        };
        self.publish_to_store(payload).await;
        if ack {
            client.send(&events::ack(&self.name, "set"));
        }
        true
    }

    /// `sync`: reply the current state. The dispatcher applies subscribe
    /// semantics for the same message afterwards.
    pub fn sync(&self, client: &ClientHandle, _message: &ClientMessage) -> bool {
        let value = match &self.kind {
            ResourceKind::Status(ch) => ch.snapshot(),
            ResourceKind::Presence(ch) => ch.snapshot(),
            ResourceKind::MessageList(ch) => ch.history(),
        };
        client.send(&events::state_reply("sync", &self.name, value));
        true
    }

    /// `publish`: append-only message traffic; message lists only. The
    /// payload is stamped with a server-assigned snowflake id.
    pub async fn publish(
        &self,
        client: &ClientHandle,
        message: &ClientMessage,
        ack: bool,
    ) -> bool {
        let payload = match &self.kind {
            ResourceKind::MessageList(ch) => ch.publish_payload(message),
            _ => return false,
        };
        self.publish_to_store(payload).await;
        if ack {
            client.send(&events::ack(&self.name, "publish"));
        }
        true
    }

    /// Apply a cross-node update and fan it out to local subscribers.
    pub fn redis_in(&self, payload: Value) {
        match &self.kind {
            ResourceKind::Status(ch) => ch.apply(&payload),
            ResourceKind::Presence(ch) => ch.apply(&payload),
            ResourceKind::MessageList(ch) => ch.apply(&payload),
        }
        self.fan_out(&payload);
    }

    fn fan_out(&self, payload: &Value) {
        let frame = payload.to_string();
        for client in self.subscribers.lock().values() {
            client.send_raw(frame.clone());
        }
    }

    async fn publish_to_store(&self, payload: Value) {
        if let Err(err) = self.bridge.publish(&self.name, payload.to_string()).await {
            tracing::error!(resource = %self.name, %err, "store publish failed");
        }
    }
}
