//! Best-effort audit side channel.
//!
//! Counts every frame crossing the transport boundary and records messages
//! addressed to the reserved `audit` channel. Everything here is a handful of
//! atomic increments — it can never block or fail message delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use super::client::ClientHandle;
use super::events::ClientMessage;

/// Messages targeting this resource name bypass routing entirely.
pub const AUDIT_CHANNEL: &str = "audit";

pub struct Audit {
    sent: AtomicU64,
    received: AtomicU64,
    audited: AtomicU64,
}

impl Audit {
    pub fn new() -> Self {
        Self {
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            audited: AtomicU64::new(0),
        }
    }

    /// Record one outbound frame.
    pub fn send(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one inbound frame.
    pub fn receive(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message a client addressed to the audit channel.
    pub fn log(&self, client: &ClientHandle, message: &ClientMessage) {
        self.audited.fetch_add(1, Ordering::Relaxed);
        tracing::info!(cid = %client.id, payload = ?message.rest, "audit message");
    }

    /// Log and reset the interval counters. Returns (sent, received).
    pub fn totals(&self) -> (u64, u64) {
        let sent = self.sent.swap(0, Ordering::Relaxed);
        let received = self.received.swap(0, Ordering::Relaxed);
        tracing::info!(sent, received, "audit totals");
        (sent, received)
    }
}

impl Default for Audit {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the periodic totals flush. The handle is owned by the broker state
/// and aborted at shutdown.
pub fn spawn_flush(audit: Arc<Audit>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        interval.tick().await; // First tick fires immediately; skip it.
        loop {
            interval.tick().await;
            audit.totals();
        }
    })
}
