pub mod config;
pub mod gateway;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use config::Config;
use gateway::audit::Audit;
use gateway::bridge::{self, StoreBridge};
use gateway::fanout::BrokerEvents;
use gateway::registry::ResourceRegistry;
use gateway::resource::ResourceTypes;

/// Shared broker state available to every connection and route handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ResourceRegistry>,
    pub bridge: Arc<dyn StoreBridge>,
    pub events: Arc<BrokerEvents>,
    pub audit: Arc<Audit>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl AppState {
    /// Wire up the broker around a store bridge and its inbound channel, and
    /// start the background tasks (store inbound router, audit flush).
    pub fn new(
        config: Config,
        bridge: Arc<dyn StoreBridge>,
        inbound: mpsc::UnboundedReceiver<(String, String)>,
    ) -> Self {
        let types = ResourceTypes::from_config(&config);
        Self::with_types(config, types, bridge, inbound)
    }

    /// Same as `new`, with an explicit resource-type table (tests inject
    /// authorization predicates this way).
    pub fn with_types(
        config: Config,
        types: ResourceTypes,
        bridge: Arc<dyn StoreBridge>,
        inbound: mpsc::UnboundedReceiver<(String, String)>,
    ) -> Self {
        let registry = Arc::new(ResourceRegistry::new(bridge.clone(), types));
        let audit = Arc::new(Audit::new());
        let router = bridge::spawn_inbound_router(registry.clone(), inbound);
        let flush = gateway::audit::spawn_flush(
            audit.clone(),
            Duration::from_secs(config.audit_flush_secs),
        );
        Self {
            config: Arc::new(config),
            registry,
            bridge,
            events: Arc::new(BrokerEvents::new()),
            audit,
            tasks: Arc::new(Mutex::new(vec![router, flush])),
        }
    }

    /// Tear the broker down: destroy every resource and stop the background
    /// tasks as a unit.
    pub fn terminate(&self) {
        tracing::info!("broker terminating");
        self.registry.terminate_all();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
