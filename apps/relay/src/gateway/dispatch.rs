//! Message dispatcher: the sole entry point for client-originated operations.
//!
//! Pipeline, in order: parse, audit-channel short-circuit, shape check,
//! resource resolution, authorization, op dispatch, broker-event emission.
//! Nothing in here propagates an error past this boundary — malformed traffic
//! is logged and dropped, and the only user-visible failure is the auth error
//! reply.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::AppState;

use super::audit::AUDIT_CHANNEL;
use super::client::ClientHandle;
use super::events::{self, ClientMessage};
use super::fanout::BrokerEvents;

/// Emission guard shared between the dispatch path and the resource's ready
/// callback. The broker-level event for a message fires at most once, only
/// after dispatch has finished, and only once the target resource's store
/// subscription is acknowledged — whichever of the two paths observes both
/// conditions first wins the `emitted` swap.
#[derive(Default)]
struct EmitFlags {
    subscribed: AtomicBool,
    dispatched: AtomicBool,
    emitted: AtomicBool,
}

fn maybe_emit(
    flags: &EmitFlags,
    events: &BrokerEvents,
    client: &ClientHandle,
    message: &ClientMessage,
) {
    if flags.dispatched.load(Ordering::SeqCst)
        && flags.subscribed.load(Ordering::SeqCst)
        && !flags.emitted.swap(true, Ordering::SeqCst)
    {
        events.emit(&message.op, client, message);
    }
}

/// Process one raw client frame.
pub async fn handle_message(state: &AppState, client: &ClientHandle, raw: &str) {
    let message: ClientMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(cid = %client.id, %err, "unparseable frame, dropping");
            return;
        }
    };

    // Audit traffic bypasses routing entirely.
    if message.to == AUDIT_CHANNEL {
        state.audit.log(client, &message);
        return;
    }

    if message.op.is_empty() || message.to.is_empty() {
        tracing::warn!(cid = %client.id, raw, "message missing op/to, dropping");
        return;
    }

    tracing::info!(
        cid = %client.id,
        op = %message.op,
        to = %message.to,
        exists = state.registry.get(&message.to).is_some(),
        requested = state.registry.is_requested(&message.to),
        "message received"
    );

    let flags = Arc::new(EmitFlags::default());
    let on_ready = {
        let flags = flags.clone();
        let broker_events = state.events.clone();
        let client = client.clone();
        let message = message.clone();
        Box::new(move || {
            flags.subscribed.store(true, Ordering::SeqCst);
            maybe_emit(&flags, &broker_events, &client, &message);
        })
    };

    let Some(resource) = state.registry.resolve(&message.to, on_ready) else {
        // Unclassifiable name: nothing was created and nothing is dispatched.
        tracing::warn!(cid = %client.id, to = %message.to, "unknown resource type, dropping");
        return;
    };

    if let Some(auth) = resource.options.auth.as_ref() {
        if !auth(&message, client) {
            client.send(&events::auth_error());
            tracing::error!(cid = %client.id, to = %message.to, "authorization denied");
            return;
        }
    }

    let ack = message.ack;
    match message.op.as_str() {
        "get" => {
            resource.get_status(client, &message);
        }
        "set" => {
            resource.set_status(client, &message, ack).await;
        }
        "sync" => {
            // sync implies subscribe: a client requesting sync always also
            // becomes a subscriber.
            resource.sync(client, &message);
            resource.subscribe(client, ack);
        }
        "subscribe" => {
            resource.subscribe(client, ack);
        }
        "unsubscribe" => {
            resource.unsubscribe(client, ack).await;
            if resource.subscriber_count() == 0 {
                state.registry.destroy(&message.to);
            }
        }
        "publish" => {
            resource.publish(client, &message, ack).await;
        }
        other => {
            tracing::debug!(cid = %client.id, op = other, "unrecognized op");
        }
    }

    flags.dispatched.store(true, Ordering::SeqCst);
    maybe_emit(&flags, state.events.as_ref(), client, &message);
}
