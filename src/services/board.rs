//! Board session service — host/viewer join and canvas relay.
//!
//! DESIGN
//! ======
//! A board moves from unseeded (no host yet) to live (host bound) to
//! orphaned (host gone, snapshot kept) and back to live on the next host
//! join. The pure functions here take the board record and return the frames
//! to deliver; the async wrappers run them inside the board's critical
//! section via `AppState::apply`.
//!
//! TRADE-OFFS
//! ==========
//! Only a host join writes the stored snapshot. Relayed deltas go to peers
//! and are never folded in, so a delta that no host re-snapshots is lost for
//! later viewers once the host leaves. The host is authoritative; there is
//! no merge.
//!
//! Relay is permissive: any connection may push a delta for any board,
//! whether or not it is the host or even a member.

use serde_json::Value;
use tracing::{debug, info};

use crate::event::{self, ConnectionId, Delivery, Role};
use crate::frame::now_ms;
use crate::state::{AppState, BoardRoom};

// =============================================================================
// PURE HANDLERS
// =============================================================================

/// Join `conn` to the board as host or viewer.
///
/// Host: stores `snapshot`, binds the host, subscribes. Viewer: subscribes,
/// receives the current snapshot (or the unseeded signal), and the bound host
/// is told a viewer arrived. A connection holds one role per board, so a host
/// re-joining as viewer gives up the binding.
pub fn join(
    room: &mut BoardRoom,
    board_id: &str,
    conn: ConnectionId,
    role: Role,
    snapshot: Value,
    timestamp: i64,
) -> Vec<Delivery> {
    room.subscribe(conn);

    match role {
        Role::Host => {
            room.store_snapshot(snapshot);
            room.bind_host(conn);
            Vec::new()
        }
        Role::Viewer => {
            room.unbind_host(conn);
            let mut out = vec![Delivery::direct(conn, event::send_current_data(board_id, room.snapshot()))];
            if let Some(host) = room.host() {
                out.push(Delivery::direct(host, event::viewer_joined(board_id, conn, timestamp)));
            }
            out
        }
    }
}

/// Broadcast a delta to every drawing member except the sender.
pub fn relay(room: &BoardRoom, board_id: &str, conn: ConnectionId, delta: Value) -> Vec<Delivery> {
    let recipients = room.members_except(conn);
    if recipients.is_empty() {
        return Vec::new();
    }
    vec![Delivery::fanout(recipients, event::canvas_data(board_id, conn, delta))]
}

/// Drop every drawing role `conn` holds on this board. Returns true if
/// anything changed.
pub fn forget(room: &mut BoardRoom, conn: ConnectionId) -> bool {
    let was_host = room.unbind_host(conn);
    let was_member = room.unsubscribe(conn);
    was_host || was_member
}

// =============================================================================
// JOIN / RELAY
// =============================================================================

/// Join a board whose id has already been resolved to its full form.
pub async fn join_board(state: &AppState, board_id: &str, conn: ConnectionId, role: Role, snapshot: Value) {
    let clients = state.clients.clone();
    state
        .apply(board_id, |room| {
            let before = room.phase(|c| clients.is_connected(c));
            let out = join(room, board_id, conn, role, snapshot, now_ms());
            info!(
                %board_id,
                %conn,
                ?role,
                ?before,
                members = room.member_count(),
                "board: joined"
            );
            out
        })
        .await;
}

/// Relay a canvas delta. A board nobody has joined is a no-op.
pub async fn relay_update(state: &AppState, board_id: &str, conn: ConnectionId, delta: Value) {
    let sent = state
        .apply_existing(board_id, |room| {
            if !room.is_member(conn) {
                debug!(%board_id, %conn, "board: relay from non-member");
            }
            relay(room, board_id, conn, delta)
        })
        .await;
    debug!(%board_id, %conn, sent = sent.unwrap_or(0), "board: relayed canvas data");
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
