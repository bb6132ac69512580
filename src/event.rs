//! Typed events — inbound frame parsing and outbound event construction.
//!
//! DESIGN
//! ======
//! The socket speaks in loosely-shaped frames. This module is the only place
//! that knows which data keys each event carries: inbound frames become an
//! exhaustive `Event` enum, and every outbound event has one constructor.
//! Handlers return `Delivery` values instead of sending anything themselves,
//! so they can be tested without a live socket.

use serde_json::Value;
use uuid::Uuid;

use crate::frame::{Data, FRAME_BOARD_ID, FRAME_DATA, FRAME_PEER_ID, FRAME_SOCKET_ID, Frame};

/// Identifier of one live socket connection.
pub type ConnectionId = Uuid;

// =============================================================================
// EVENT NAMES
// =============================================================================

pub const JOIN_BOARD: &str = "join-board";
pub const CANVAS_DATA: &str = "canvas-data";
pub const JOIN_VOICE: &str = "join-voice";
pub const LEAVE_VOICE: &str = "leave-voice";

pub const SESSION_CONNECTED: &str = "session:connected";
pub const SEND_CURRENT_DATA: &str = "send-current-data";
pub const VIEWER_JOINED: &str = "viewer-joined";
pub const USER_JOINED_VOICE: &str = "user-joined-voice";
pub const ALL_PEERS: &str = "all-peers";
pub const USER_LEFT_VOICE: &str = "user-left-voice";

// =============================================================================
// INBOUND
// =============================================================================

/// Role requested on `join-board`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Viewer,
}

impl Role {
    /// Anything other than `"host"` joins as a viewer.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(r) if r.eq_ignore_ascii_case("host") => Self::Host,
            _ => Self::Viewer,
        }
    }
}

/// Inbound client event. `disconnect` is not a frame and is handled by the
/// socket loop directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    JoinBoard { board_id: String, snapshot: Value, role: Role },
    CanvasData { board_id: String, delta: Value },
    JoinVoice { board_id: String, peer_id: String },
    LeaveVoice { board_id: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventError {
    #[error("unknown event: {0}")]
    Unknown(String),
    #[error("{event}: missing {field}")]
    MissingField { event: &'static str, field: &'static str },
}

impl Event {
    /// Board id named by the event, as sent by the client.
    #[must_use]
    pub fn board_id(&self) -> &str {
        match self {
            Self::JoinBoard { board_id, .. }
            | Self::CanvasData { board_id, .. }
            | Self::JoinVoice { board_id, .. }
            | Self::LeaveVoice { board_id } => board_id,
        }
    }
}

impl TryFrom<&Frame> for Event {
    type Error = EventError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        let event: &'static str = match frame.syscall.as_str() {
            JOIN_BOARD => JOIN_BOARD,
            CANVAS_DATA => CANVAS_DATA,
            JOIN_VOICE => JOIN_VOICE,
            LEAVE_VOICE => LEAVE_VOICE,
            other => return Err(EventError::Unknown(other.to_owned())),
        };

        let board_id = frame
            .board_id()
            .ok_or(EventError::MissingField { event, field: FRAME_BOARD_ID })?
            .to_owned();

        match event {
            JOIN_BOARD => Ok(Self::JoinBoard {
                board_id,
                snapshot: frame.data.get(FRAME_DATA).cloned().unwrap_or(Value::Null),
                role: Role::parse(frame.str_field("role")),
            }),
            CANVAS_DATA => {
                let delta = frame
                    .data
                    .get(FRAME_DATA)
                    .filter(|v| !v.is_null())
                    .cloned()
                    .ok_or(EventError::MissingField { event, field: FRAME_DATA })?;
                Ok(Self::CanvasData { board_id, delta })
            }
            JOIN_VOICE => {
                let peer_id = frame
                    .str_field(FRAME_PEER_ID)
                    .filter(|p| !p.is_empty())
                    .ok_or(EventError::MissingField { event, field: FRAME_PEER_ID })?
                    .to_owned();
                Ok(Self::JoinVoice { board_id, peer_id })
            }
            _ => Ok(Self::LeaveVoice { board_id }),
        }
    }
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// One outbound frame and the connections that must receive it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub to: Vec<ConnectionId>,
    pub frame: Frame,
}

impl Delivery {
    /// Point-to-point delivery.
    #[must_use]
    pub fn direct(to: ConnectionId, frame: Frame) -> Self {
        Self { to: vec![to], frame }
    }

    /// Fan-out to an already-filtered recipient list.
    #[must_use]
    pub fn fanout(to: Vec<ConnectionId>, frame: Frame) -> Self {
        Self { to, frame }
    }
}

/// Greeting sent on upgrade so the client learns its own connection id.
#[must_use]
pub fn session_connected(socket_id: ConnectionId) -> Frame {
    Frame::request(SESSION_CONNECTED, Data::new()).with_data(FRAME_SOCKET_ID, socket_id.to_string())
}

/// Current snapshot for a newly joined viewer. `snapshot = None` is the
/// "no data yet" signal: `data` is null and `seeded` is false.
#[must_use]
pub fn send_current_data(board_id: &str, snapshot: Option<&Value>) -> Frame {
    Frame::request(SEND_CURRENT_DATA, Data::new())
        .with_board_id(board_id)
        .with_data(FRAME_BOARD_ID, board_id)
        .with_data(FRAME_DATA, snapshot.cloned().unwrap_or(Value::Null))
        .with_data("seeded", snapshot.is_some())
}

#[must_use]
pub fn viewer_joined(board_id: &str, viewer: ConnectionId, timestamp: i64) -> Frame {
    Frame::request(VIEWER_JOINED, Data::new())
        .with_board_id(board_id)
        .with_data(FRAME_BOARD_ID, board_id)
        .with_data(FRAME_SOCKET_ID, viewer.to_string())
        .with_data("timestamp", timestamp)
}

#[must_use]
pub fn canvas_data(board_id: &str, from: ConnectionId, delta: Value) -> Frame {
    Frame::request(CANVAS_DATA, Data::new())
        .with_board_id(board_id)
        .with_from(from.to_string())
        .with_data(FRAME_BOARD_ID, board_id)
        .with_data(FRAME_DATA, delta)
}

#[must_use]
pub fn user_joined_voice(board_id: &str, socket_id: ConnectionId, peer_id: &str) -> Frame {
    Frame::request(USER_JOINED_VOICE, Data::new())
        .with_board_id(board_id)
        .with_data(FRAME_SOCKET_ID, socket_id.to_string())
        .with_data(FRAME_PEER_ID, peer_id)
}

#[must_use]
pub fn all_peers(board_id: &str, peers: Vec<String>) -> Frame {
    Frame::request(ALL_PEERS, Data::new())
        .with_board_id(board_id)
        .with_data("peers", peers)
}

#[must_use]
pub fn user_left_voice(board_id: &str, socket_id: ConnectionId, peer_id: &str) -> Frame {
    Frame::request(USER_LEFT_VOICE, Data::new())
        .with_board_id(board_id)
        .with_data(FRAME_SOCKET_ID, socket_id.to_string())
        .with_data(FRAME_PEER_ID, peer_id)
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
