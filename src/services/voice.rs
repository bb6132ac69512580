//! Voice signaling service — peer discovery for a full-mesh voice overlay.
//!
//! DESIGN
//! ======
//! Each board carries a voice channel separate from its drawing channel:
//! connection id -> opaque peer id. The server only introduces peers to each
//! other; media and SDP exchange happen directly between clients.
//!
//! A joiner gets `all-peers` (everyone else's peer id) and everyone else gets
//! `user-joined-voice`. Leaving, explicitly or by losing the socket, sends
//! `user-left-voice` to whoever remains. Both lists are computed from the
//! same locked view of the room as the mutation they describe.

use tracing::info;

use crate::event::{self, ConnectionId, Delivery};
use crate::state::{AppState, BoardRoom};

// =============================================================================
// PURE HANDLERS
// =============================================================================

/// Add `conn` to the voice room under `peer_id`. A repeat join replaces the
/// connection's previous peer id.
pub fn join(room: &mut BoardRoom, board_id: &str, conn: ConnectionId, peer_id: String) -> Vec<Delivery> {
    room.join_voice(conn, peer_id.clone());

    let others = room.voice_except(conn);
    let recipients: Vec<ConnectionId> = others.iter().map(|(c, _)| *c).collect();
    let peers: Vec<String> = others.iter().map(|(_, p)| (*p).to_owned()).collect();

    let mut out = Vec::with_capacity(2);
    if !recipients.is_empty() {
        out.push(Delivery::fanout(recipients, event::user_joined_voice(board_id, conn, &peer_id)));
    }
    out.push(Delivery::direct(conn, event::all_peers(board_id, peers)));
    out
}

/// Remove `conn` from the voice room. No-op if it was not in it.
pub fn leave(room: &mut BoardRoom, board_id: &str, conn: ConnectionId) -> Vec<Delivery> {
    let Some(peer_id) = room.leave_voice(conn) else {
        return Vec::new();
    };

    let remaining: Vec<ConnectionId> = room.voice_except(conn).into_iter().map(|(c, _)| c).collect();
    if remaining.is_empty() {
        return Vec::new();
    }
    vec![Delivery::fanout(remaining, event::user_left_voice(board_id, conn, &peer_id))]
}

// =============================================================================
// JOIN / LEAVE
// =============================================================================

pub async fn join_voice(state: &AppState, board_id: &str, conn: ConnectionId, peer_id: String) {
    state
        .apply(board_id, |room| {
            let out = join(room, board_id, conn, peer_id);
            info!(%board_id, %conn, peers = room.voice_count(), "voice: joined");
            out
        })
        .await;
}

pub async fn leave_voice(state: &AppState, board_id: &str, conn: ConnectionId) {
    state
        .apply_existing(board_id, |room| {
            if room.voice_peer(conn).is_none() {
                return Vec::new();
            }
            let out = leave(room, board_id, conn);
            info!(%board_id, %conn, peers = room.voice_count(), "voice: left");
            out
        })
        .await;
}

#[cfg(test)]
#[path = "voice_test.rs"]
mod tests;
