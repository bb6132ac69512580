//! Frame — the universal message type on the drawing socket.
//!
//! ARCHITECTURE
//! ============
//! Every message exchanged over `/api/ws` is a Frame. Clients send request
//! frames whose `syscall` names the event (`join-board`, `canvas-data`, ...),
//! the lifecycle handler parses them into typed events, and the coordinators
//! answer with request frames of their own (`send-current-data`,
//! `user-joined-voice`, ...).
//!
//! DESIGN
//! ======
//! - Flat data: payload is always `Map<String, Value>`. Canvas snapshots and
//!   deltas ride inside it as opaque values.
//! - Inbound frames only need `syscall`; every other field has a default so
//!   thin clients can send `{"syscall": "leave-voice", "data": {...}}`.
//! - Board ids are opaque strings, never parsed.
//! - Events carry no request/response correlation. Unknown envelope fields
//!   such as `status` or `parent_id` from richer clients are ignored.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Frame data key for the board identifier.
pub const FRAME_BOARD_ID: &str = "boardId";

/// Frame data key for canvas payloads (snapshots and deltas).
pub const FRAME_DATA: &str = "data";

/// Frame data key for a connection identifier.
pub const FRAME_SOCKET_ID: &str = "socketId";

/// Frame data key for a voice peer identifier.
pub const FRAME_PEER_ID: &str = "peerId";

// =============================================================================
// TYPES
// =============================================================================

/// Flat key-value payload. Alias to reduce noise in signatures.
pub type Data = HashMap<String, serde_json::Value>;

/// The universal message type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    #[serde(default = "now_ms")]
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    pub syscall: String,
    #[serde(default)]
    pub data: Data,
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Frame {
    /// Create a request frame. Every outbound event starts here.
    pub fn request(syscall: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            ts: now_ms(),
            board_id: None,
            from: None,
            syscall: syscall.into(),
            data,
        }
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Frame {
    #[must_use]
    pub fn with_board_id(mut self, board_id: impl Into<String>) -> Self {
        self.board_id = Some(board_id.into());
        self
    }

    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// ACCESSORS
// =============================================================================

impl Frame {
    /// Board id from `data.boardId`, falling back to the top-level `board_id`.
    /// Empty strings count as absent.
    #[must_use]
    pub fn board_id(&self) -> Option<&str> {
        self.str_field(FRAME_BOARD_ID)
            .or(self.board_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// String value of a data field, if present and a string.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }
}

// =============================================================================
// TESTS
// =============================================================================
