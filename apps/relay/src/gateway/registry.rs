//! Resource registry: lazy, deduplicated creation, store subscription
//! lifecycle, and teardown.
//!
//! The name → resource map is the process-wide shared state of the broker;
//! it is only reachable through the narrow resolve/destroy/terminate surface
//! here. The store's subscribe acknowledgment arrives on a later task turn,
//! so readiness checks and the pending-callback queue live behind one mutex
//! per resource: a caller either observes "acknowledged" and runs its ready
//! callback immediately, or is queued and drained by the acknowledgment —
//! exactly once either way.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::bridge::StoreBridge;
use super::resource::{ReadyCallback, Resource, ResourceType, ResourceTypes};

pub struct ResourceRegistry {
    channels: Arc<DashMap<String, Arc<Resource>>>,
    /// Names a store subscribe request has been issued for.
    subs: Arc<DashMap<String, bool>>,
    bridge: Arc<dyn StoreBridge>,
    types: Arc<ResourceTypes>,
}

impl ResourceRegistry {
    pub fn new(bridge: Arc<dyn StoreBridge>, types: ResourceTypes) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            subs: Arc::new(DashMap::new()),
            bridge,
            types: Arc::new(types),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Resource>> {
        self.channels.get(name).map(|r| r.value().clone())
    }

    /// Whether a store subscribe request has been issued for `name`.
    pub fn is_requested(&self, name: &str) -> bool {
        self.subs.contains_key(name)
    }

    /// Every currently registered resource.
    pub fn snapshot(&self) -> Vec<Arc<Resource>> {
        self.channels.iter().map(|e| e.value().clone()).collect()
    }

    /// Resolve or lazily create the resource for `name`.
    ///
    /// `on_ready` runs synchronously if the store subscription is already
    /// acknowledged; otherwise it is queued and runs when the acknowledgment
    /// lands. Unclassifiable names return `None` and the callback is dropped,
    /// never invoked.
    pub fn resolve(&self, name: &str, on_ready: ReadyCallback) -> Option<Arc<Resource>> {
        let resource = match self.channels.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let rtype = ResourceType::classify(name)?;
                let resource = Arc::new(Resource::new(
                    name,
                    rtype,
                    &self.types,
                    self.bridge.clone(),
                ));
                entry.insert(resource.clone());
                self.subs.insert(name.to_string(), true);
                tracing::info!(resource = name, ?rtype, "created, subscribing to store");
                self.spawn_subscribe(name.to_string());
                resource
            }
        };

        if let Some(ready) = resource.when_ready(on_ready) {
            ready();
        }
        Some(resource)
    }

    /// Issue the single store subscribe request for a freshly created
    /// resource and complete its readiness when the acknowledgment arrives.
    fn spawn_subscribe(&self, name: String) {
        let bridge = self.bridge.clone();
        let channels = self.channels.clone();
        tokio::spawn(async move {
            if let Err(err) = bridge.subscribe(&name).await {
                // The resource never becomes acknowledged; queued ready
                // callbacks simply never fire.
                tracing::error!(resource = %name, %err, "store subscribe failed");
                return;
            }
            // The resource may have been destroyed while the request was in
            // flight; check before mutating.
            let Some(resource) = channels.get(&name).map(|r| r.value().clone()) else {
                tracing::debug!(resource = %name, "destroyed before store subscribe ack");
                return;
            };
            let (latency, pending) = resource.note_ready();
            tracing::debug!(
                resource = %name,
                took_ms = latency.as_millis() as u64,
                waiters = pending.len(),
                "store subscribe acknowledged"
            );
            for ready in pending {
                ready();
            }
        });
    }

    /// Remove the resource and its store subscription. Idempotent: destroying
    /// an absent name is a no-op.
    pub fn destroy(&self, name: &str) {
        let existed = self.channels.remove(name).is_some();
        self.subs.remove(name);
        if !existed {
            return;
        }
        tracing::info!(resource = name, "destroyed, unsubscribing from store");
        let bridge = self.bridge.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            if let Err(err) = bridge.unsubscribe(&name).await {
                tracing::error!(resource = %name, %err, "store unsubscribe failed");
            }
        });
    }

    /// Destroy every registered resource.
    pub fn terminate_all(&self) {
        let names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.destroy(&name);
        }
    }
}
