//! WebSocket handler — connection lifecycle and event dispatch.
//!
//! DESIGN
//! ======
//! On upgrade, registers the connection's outbound queue, sends
//! `session:connected` with the socket id, and enters a `select!` loop:
//! - Incoming client frames → parse into a typed `Event` → dispatch
//! - Queued frames from coordinators → forward to the client
//!
//! Handlers never write to the socket. Every outbound frame, including
//! replies to the sender, goes through the connection's queue, so frames
//! for one client leave in the order the coordinators produced them.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register queue → `session:connected`
//! 2. Client frames → resolve board id → board/voice service. Joins always
//!    consult the registry; other events reuse the connection's cache.
//! 3. Close or error → `disconnect`: unregister, leave every voice room,
//!    optionally drop drawing roles
//!
//! ERROR HANDLING
//! ==============
//! Malformed frames and events missing required fields are logged and
//! dropped. Nothing is ever sent back as an error.

use std::collections::HashMap;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::{self, ConnectionId, Event};
use crate::frame::Frame;
use crate::services::registry::{self, BoardRegistry};
use crate::services::{board, voice};
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Per-connection context owned by the socket loop.
struct Connection {
    id: ConnectionId,
    /// Short board codes this connection has used -> resolved ids. Keeps
    /// high-rate events off the registry after the first lookup.
    aliases: HashMap<String, String>,
}

impl Connection {
    fn new(id: ConnectionId) -> Self {
        Self { id, aliases: HashMap::new() }
    }

    /// Canonical id for a board named by a non-join event. Short codes go
    /// through the registry once per connection, then hit the cache.
    async fn resolve(&mut self, registry: &dyn BoardRegistry, board_id: String) -> String {
        if let Some(full) = self.aliases.get(&board_id) {
            return full.clone();
        }
        let full = registry::resolve_board_id(registry, &board_id).await;
        self.remember(board_id, &full);
        full
    }

    fn remember(&mut self, requested: String, resolved: &str) {
        if registry::is_short_id(&requested) {
            self.aliases.insert(requested, resolved.to_owned());
        }
    }
}

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let mut conn = Connection::new(Uuid::new_v4());

    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(state.config.client_channel_capacity);
    state.clients.register(conn.id, client_tx);
    info!(socket_id = %conn.id, clients = state.clients.len(), "ws: client connected");

    if send_frame(&mut socket, &event::session_connected(conn.id)).await.is_ok() {
        loop {
            tokio::select! {
                msg = socket.recv() => {
                    let Some(Ok(msg)) = msg else { break };
                    match msg {
                        Message::Text(text) => {
                            process_inbound_text(&state, &mut conn, &text).await;
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                Some(frame) = client_rx.recv() => {
                    if send_frame(&mut socket, &frame).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    disconnect(&state, conn.id).await;
    info!(socket_id = %conn.id, "ws: client disconnected");
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Parse one inbound text frame and dispatch it.
async fn process_inbound_text(state: &AppState, conn: &mut Connection, text: &str) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(socket_id = %conn.id, error = %e, "ws: invalid inbound frame");
            return;
        }
    };

    match Event::try_from(&frame) {
        Ok(event) => dispatch(state, conn, event).await,
        Err(e) => {
            warn!(socket_id = %conn.id, id = %frame.id, syscall = %frame.syscall, error = %e, "ws: dropped frame");
        }
    }
}

async fn dispatch(state: &AppState, conn: &mut Connection, event: Event) {
    debug!(socket_id = %conn.id, board_id = event.board_id(), ?event, "ws: recv event");

    match event {
        Event::JoinBoard { board_id, snapshot, role } => {
            let full = registry::resolve_board_id(state.registry.as_ref(), &board_id).await;
            conn.remember(board_id, &full);
            board::join_board(state, &full, conn.id, role, snapshot).await;
        }
        Event::CanvasData { board_id, delta } => {
            let full = conn.resolve(state.registry.as_ref(), board_id).await;
            board::relay_update(state, &full, conn.id, delta).await;
        }
        Event::JoinVoice { board_id, peer_id } => {
            let full = conn.resolve(state.registry.as_ref(), board_id).await;
            voice::join_voice(state, &full, conn.id, peer_id).await;
        }
        Event::LeaveVoice { board_id } => {
            let full = conn.resolve(state.registry.as_ref(), board_id).await;
            voice::leave_voice(state, &full, conn.id).await;
        }
    }
}

// =============================================================================
// DISCONNECT
// =============================================================================

/// Connection-loss cleanup. Leaves every voice room the connection is in and,
/// when configured, drops its drawing roles. Safe to call more than once.
async fn disconnect(state: &AppState, socket_id: ConnectionId) {
    // Unregister first so nothing is queued for a socket that is going away.
    state.clients.unregister(socket_id);
    let prune = state.config.prune_drawing_on_disconnect;

    for (board_id, room) in state.rooms.all().await {
        state
            .cleanup_room(&room, |room| {
                let out = if room.voice_peer(socket_id).is_some() {
                    let out = voice::leave(room, &board_id, socket_id);
                    info!(%board_id, %socket_id, peers = room.voice_count(), "voice: left on disconnect");
                    out
                } else {
                    Vec::new()
                };
                if prune && board::forget(room, socket_id) {
                    debug!(%board_id, %socket_id, "board: dropped drawing roles on disconnect");
                }
                out
            })
            .await;
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    debug!(id = %frame.id, syscall = %frame.syscall, "ws: send frame");
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
