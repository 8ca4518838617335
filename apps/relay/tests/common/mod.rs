#![allow(dead_code)] // Each test binary uses a different subset of helpers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;

use relay::config::Config;
use relay::gateway::bridge::MemoryBridge;
use relay::gateway::client::ClientHandle;
use relay::gateway::resource::ResourceTypes;
use relay::AppState;

/// Broker state wired to an in-memory loopback bridge.
pub fn test_state() -> (AppState, Arc<MemoryBridge>) {
    let (bridge, inbound) = MemoryBridge::new();
    let state = AppState::new(Config::default(), bridge.clone(), inbound);
    (state, bridge)
}

/// Broker state with an explicit resource-type table (for auth predicates).
pub fn test_state_with_types(types: ResourceTypes) -> (AppState, Arc<MemoryBridge>) {
    let (bridge, inbound) = MemoryBridge::new();
    let state = AppState::with_types(Config::default(), types, bridge.clone(), inbound);
    (state, bridge)
}

/// A fake connected client: the handle the broker sees plus the receiving
/// end of its outbound queue.
pub fn test_client(name: &str) -> (ClientHandle, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ClientHandle::new(format!("cli_{name}"), tx), rx)
}

/// Drain the next queued frame, parsed as JSON. `None` if nothing is queued.
pub fn next_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<serde_json::Value> {
    rx.try_recv()
        .ok()
        .map(|frame| serde_json::from_str(&frame).expect("frame is JSON"))
}

/// Let spawned broker tasks settle.
pub async fn settle() {
    time::sleep(Duration::from_millis(25)).await;
}

/// Poll `cond` until it holds, panicking after two seconds.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
