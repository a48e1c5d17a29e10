//! WebSocket session lifecycle.
//!
//! One task pair per connection: the session task reads inbound frames and
//! routes them; a spawned outbound task drains the connection's send buffer,
//! drives the heartbeat, and closes the socket on eviction or shutdown.
//! Teardown unregisters the connection and, if it still owned the user
//! mapping, flips the user offline.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info};

use parley_core::models::PresenceStatus;

use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_DISCONNECTIONS_TOTAL, WS_MALFORMED_TOTAL,
};
use crate::presence;
use crate::server::AppState;

use super::connection::ClientConnection;
use super::router;

/// Run a WebSocket session to completion.
pub async fn run_ws_session(socket: WebSocket, conn_id: String, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut buffered) = mpsc::channel::<Arc<String>>(state.config.send_buffer);
    let conn = Arc::new(ClientConnection::new(conn_id, tx));
    state.registry.add(conn.clone()).await;

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(conn_id = %conn.id, "websocket connected");

    let heartbeat = Duration::from_secs(state.config.heartbeat_interval_secs);
    let pong_timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);
    let evict_token = conn.eviction_token();
    let shutdown_token = state.shutdown.token();

    // Outbound: buffered events, heartbeat pings, eviction/shutdown close.
    let outbound_conn = conn.clone();
    let outbound_evict = evict_token.clone();
    let outbound_shutdown = shutdown_token.clone();
    let outbound = tokio::spawn(async move {
        let mut ping = tokio::time::interval(heartbeat);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it.
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                frame = buffered.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if outbound_conn.last_pong_elapsed() > pong_timeout {
                        debug!(conn_id = %outbound_conn.id, "heartbeat timeout, closing");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
                () = outbound_evict.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                () = outbound_shutdown.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Inbound: route frames until the peer goes away or we are told to stop.
    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                let Some(Ok(message)) = inbound else {
                    debug!(conn_id = %conn.id, "websocket closed by peer");
                    break;
                };
                match message {
                    Message::Text(text) => {
                        conn.mark_alive();
                        router::handle_frame(&state, &conn, text.as_str()).await;
                    }
                    Message::Binary(_) => {
                        debug!(conn_id = %conn.id, "binary frame, dropping");
                        counter!(WS_MALFORMED_TOTAL).increment(1);
                    }
                    Message::Ping(_) | Message::Pong(_) => conn.mark_alive(),
                    Message::Close(_) => break,
                }
            }
            () = evict_token.cancelled() => break,
            () = shutdown_token.cancelled() => break,
        }
    }

    outbound.abort();
    teardown(&state, &conn).await;
}

/// Unregister and run disconnect side effects.
async fn teardown(state: &AppState, conn: &Arc<ClientConnection>) {
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(conn.age().as_secs_f64());

    let owned_user_mapping = state.registry.unregister(conn).await;
    info!(
        conn_id = %conn.id,
        dropped_events = conn.drop_count(),
        duration_secs = conn.age().as_secs(),
        "websocket disconnected"
    );

    // Only the mapping owner flips presence; a displaced connection closing
    // late must not mark the (still connected) user offline.
    if owned_user_mapping {
        if let Some(user_id) = conn.user_id() {
            presence::set_status(
                &state.store,
                &state.broadcaster,
                &state.registry,
                &user_id,
                PresenceStatus::Offline,
            )
            .await;
        }
    }
}
