//! WebSocket transport binding and per-connection event loop.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;

use relay_common::id::{self, prefix};

use crate::AppState;

use super::client::ClientHandle;
use super::dispatch;
use super::events;

pub fn router(path: &str) -> Router<AppState> {
    Router::new().route(path, get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut outbound) = mpsc::unbounded_channel();
    let client = ClientHandle::new(id::prefixed_ulid(prefix::CLIENT), tx);

    tracing::info!(cid = %client.id, "client connected");

    // The client learns which instance it landed on and its own id before any
    // of its traffic is processed.
    client.send(&events::hello(&state.config.instance_name, &client.id));

    let mut heartbeat = time::interval(Duration::from_secs(state.config.heartbeat_interval_secs));
    heartbeat.tick().await; // First tick fires immediately; skip it.

    loop {
        tokio::select! {
            // Client sends us a frame. Frames from one client are dispatched
            // in arrival order.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        state.audit.receive();
                        dispatch::handle_message(&state, &client, &text).await;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(cid = %client.id, %err, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // A resource or the broker queued a frame for this client.
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        state.audit.send();
                        if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = heartbeat.tick() => {
                if ws_tx.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!(cid = %client.id, "client disconnected");
    cleanup(&state, &client).await;
}

/// Remove a departed client from every subscriber set, with acknowledgments
/// disabled, and drop resources it leaves empty.
async fn cleanup(state: &AppState, client: &ClientHandle) {
    for resource in state.registry.snapshot() {
        if resource.is_subscriber(&client.id) {
            resource.unsubscribe(client, false).await;
            if resource.subscriber_count() == 0 {
                state.registry.destroy(&resource.name);
            }
        }
    }
}
