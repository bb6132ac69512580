//! Shared application state and the in-memory room store.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the room store (one record per full board id), the registry of live
//! connections, and the board registry used to resolve short ids.
//!
//! Each board record sits behind its own mutex; the index map is only locked
//! long enough to find or create a record, so unrelated boards never wait on
//! each other. Outbound frames produced by an operation are enqueued while
//! the board's mutex is still held: the next event for that board cannot
//! observe state that its peers have not been told about yet.
//!
//! LOCK ORDER
//! ==========
//! room index → board record → client registry. The client registry uses a
//! std lock and is never held across an await.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;
use crate::event::{ConnectionId, Delivery};
use crate::frame::Frame;
use crate::services::registry::BoardRegistry;

// =============================================================================
// BOARD ROOM
// =============================================================================

/// Where a board sits in its host lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardPhase {
    /// No host has ever joined.
    Unseeded,
    /// A connected host is bound.
    Live,
    /// Snapshot retained, but the host binding is gone or points at a dead connection.
    Orphaned,
}

/// Per-board live state. Owned by the room store; mutated only through these
/// accessors while the board's mutex is held.
#[derive(Debug)]
pub struct BoardRoom {
    /// Last snapshot supplied by a host join. `None` until the first host join.
    snapshot: Option<Value>,
    host: Option<ConnectionId>,
    /// Connections subscribed to the drawing channel (host included).
    members: HashSet<ConnectionId>,
    /// Voice channel: connection -> peer identifier.
    voice: HashMap<ConnectionId, String>,
    last_active: Instant,
}

impl BoardRoom {
    #[must_use]
    pub fn new() -> Self {
        Self::new_at(Instant::now())
    }

    #[must_use]
    pub fn new_at(now: Instant) -> Self {
        Self { snapshot: None, host: None, members: HashSet::new(), voice: HashMap::new(), last_active: now }
    }

    // --- drawing channel -----------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> Option<&Value> {
        self.snapshot.as_ref()
    }

    /// Overwrite the snapshot wholesale.
    pub fn store_snapshot(&mut self, snapshot: Value) {
        self.snapshot = Some(snapshot);
    }

    #[must_use]
    pub fn host(&self) -> Option<ConnectionId> {
        self.host
    }

    /// Bind `conn` as host. Returns the previous host, if any.
    pub fn bind_host(&mut self, conn: ConnectionId) -> Option<ConnectionId> {
        self.host.replace(conn)
    }

    /// Clear the host binding if it points at `conn`.
    pub fn unbind_host(&mut self, conn: ConnectionId) -> bool {
        if self.host == Some(conn) {
            self.host = None;
            return true;
        }
        false
    }

    pub fn subscribe(&mut self, conn: ConnectionId) -> bool {
        self.members.insert(conn)
    }

    pub fn unsubscribe(&mut self, conn: ConnectionId) -> bool {
        self.members.remove(&conn)
    }

    #[must_use]
    pub fn is_member(&self, conn: ConnectionId) -> bool {
        self.members.contains(&conn)
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Drawing members other than `conn`.
    #[must_use]
    pub fn members_except(&self, conn: ConnectionId) -> Vec<ConnectionId> {
        self.members.iter().copied().filter(|c| *c != conn).collect()
    }

    // --- voice channel -------------------------------------------------------

    /// Record `conn`'s peer id, replacing any earlier one. Returns the previous peer id.
    pub fn join_voice(&mut self, conn: ConnectionId, peer_id: String) -> Option<String> {
        self.voice.insert(conn, peer_id)
    }

    pub fn leave_voice(&mut self, conn: ConnectionId) -> Option<String> {
        self.voice.remove(&conn)
    }

    #[must_use]
    pub fn voice_peer(&self, conn: ConnectionId) -> Option<&str> {
        self.voice.get(&conn).map(String::as_str)
    }

    #[must_use]
    pub fn voice_count(&self) -> usize {
        self.voice.len()
    }

    /// Voice members other than `conn`, with their peer ids.
    #[must_use]
    pub fn voice_except(&self, conn: ConnectionId) -> Vec<(ConnectionId, &str)> {
        self.voice
            .iter()
            .filter(|(c, _)| **c != conn)
            .map(|(c, p)| (*c, p.as_str()))
            .collect()
    }

    // --- lifecycle -----------------------------------------------------------

    /// Host lifecycle phase, judged against the set of live connections.
    pub fn phase(&self, is_connected: impl Fn(ConnectionId) -> bool) -> BoardPhase {
        match (self.host, &self.snapshot) {
            (Some(host), _) if is_connected(host) => BoardPhase::Live,
            (None, None) => BoardPhase::Unseeded,
            _ => BoardPhase::Orphaned,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_active = now;
    }

    /// True when no live connection holds any role in this board.
    #[must_use]
    pub fn is_abandoned(&self, connected: &HashSet<ConnectionId>) -> bool {
        let host_live = self.host.is_some_and(|h| connected.contains(&h));
        let member_live = self.members.iter().any(|c| connected.contains(c));
        let voice_live = self.voice.keys().any(|c| connected.contains(c));
        !(host_live || member_live || voice_live)
    }

    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_active)
    }
}

impl Default for BoardRoom {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ROOM STORE
// =============================================================================

/// Process-wide map of full board id -> board record.
#[derive(Clone, Default)]
pub struct RoomStore {
    boards: Arc<RwLock<HashMap<String, Arc<Mutex<BoardRoom>>>>>,
}

impl RoomStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the board record, creating an empty one if absent.
    pub async fn get_or_create(&self, board_id: &str) -> Arc<Mutex<BoardRoom>> {
        if let Some(room) = self.boards.read().await.get(board_id) {
            return room.clone();
        }
        let mut boards = self.boards.write().await;
        boards
            .entry(board_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(BoardRoom::new())))
            .clone()
    }

    pub async fn get(&self, board_id: &str) -> Option<Arc<Mutex<BoardRoom>>> {
        self.boards.read().await.get(board_id).cloned()
    }

    /// Every board record currently held, for disconnect sweeps.
    pub async fn all(&self) -> Vec<(String, Arc<Mutex<BoardRoom>>)> {
        self.boards
            .read()
            .await
            .iter()
            .map(|(id, room)| (id.clone(), room.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.boards.read().await.len()
    }

    /// Evict boards idle for at least `ttl` that no live connection still uses.
    ///
    /// A record that is locked, or whose handle is held by an in-flight
    /// operation, is skipped and reconsidered on the next sweep.
    pub async fn evict_idle(&self, ttl: Duration, now: Instant, connected: &HashSet<ConnectionId>) -> Vec<String> {
        let mut boards = self.boards.write().await;
        let mut evicted = Vec::new();

        boards.retain(|board_id, room| {
            // Handles are only handed out under the index lock we hold, so a
            // count of one means nobody else can reach this record.
            if Arc::strong_count(room) > 1 {
                return true;
            }
            let Ok(guard) = room.try_lock() else {
                return true;
            };
            let evict = guard.idle_for(now) >= ttl && guard.is_abandoned(connected);
            if evict {
                evicted.push(board_id.clone());
            }
            !evict
        });

        evicted
    }
}

// =============================================================================
// CLIENT REGISTRY
// =============================================================================

/// Live connections and their outbound queues.
#[derive(Clone, Default)]
pub struct Clients {
    inner: Arc<StdRwLock<HashMap<ConnectionId, mpsc::Sender<Frame>>>>,
}

impl Clients {
    pub fn register(&self, conn: ConnectionId, tx: mpsc::Sender<Frame>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conn, tx);
    }

    /// Returns false if the connection was already gone.
    pub fn unregister(&self, conn: ConnectionId) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&conn)
            .is_some()
    }

    #[must_use]
    pub fn is_connected(&self, conn: ConnectionId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&conn)
    }

    #[must_use]
    pub fn connected_ids(&self) -> HashSet<ConnectionId> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Enqueue every delivery. Best-effort: unknown connections and full
    /// queues are skipped. Returns the number of frames enqueued.
    pub fn deliver(&self, deliveries: Vec<Delivery>) -> usize {
        if deliveries.is_empty() {
            return 0;
        }
        let clients = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut sent = 0;
        for Delivery { to, frame } in deliveries {
            for conn in to {
                let Some(tx) = clients.get(&conn) else {
                    debug!(%conn, syscall = %frame.syscall, "deliver: connection gone");
                    continue;
                };
                match tx.try_send(frame.clone()) {
                    Ok(()) => sent += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(%conn, syscall = %frame.syscall, "deliver: queue full, frame dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(%conn, syscall = %frame.syscall, "deliver: queue closed");
                    }
                }
            }
        }
        sent
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub rooms: RoomStore,
    pub clients: Clients,
    pub registry: Arc<dyn BoardRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, registry: Arc<dyn BoardRegistry>) -> Self {
        Self { rooms: RoomStore::new(), clients: Clients::default(), registry, config: Arc::new(config) }
    }

    /// Run `op` on the board's record (created if absent) and enqueue its
    /// deliveries before the record is released. Returns frames enqueued.
    pub async fn apply<F>(&self, board_id: &str, op: F) -> usize
    where
        F: FnOnce(&mut BoardRoom) -> Vec<Delivery>,
    {
        let room = self.rooms.get_or_create(board_id).await;
        self.apply_room(&room, op).await
    }

    /// Like `apply`, but a missing board is a no-op returning `None`.
    pub async fn apply_existing<F>(&self, board_id: &str, op: F) -> Option<usize>
    where
        F: FnOnce(&mut BoardRoom) -> Vec<Delivery>,
    {
        let room = self.rooms.get(board_id).await?;
        Some(self.apply_room(&room, op).await)
    }

    pub async fn apply_room<F>(&self, room: &Mutex<BoardRoom>, op: F) -> usize
    where
        F: FnOnce(&mut BoardRoom) -> Vec<Delivery>,
    {
        let mut guard = room.lock().await;
        guard.touch(Instant::now());
        let deliveries = op(&mut guard);
        self.clients.deliver(deliveries)
    }

    /// Like `apply_room`, but does not count as activity. Used by disconnect
    /// cleanup, which visits every board.
    pub async fn cleanup_room<F>(&self, room: &Mutex<BoardRoom>, op: F) -> usize
    where
        F: FnOnce(&mut BoardRoom) -> Vec<Delivery>,
    {
        let mut guard = room.lock().await;
        let deliveries = op(&mut guard);
        self.clients.deliver(deliveries)
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::services::registry::MemoryBoardRegistry;
    use tokio::time::{Duration, timeout};

    /// `AppState` backed by an in-memory registry with the given board ids.
    #[must_use]
    pub fn test_app_state_with(config: Config, board_ids: &[&str]) -> AppState {
        let registry = MemoryBoardRegistry::new(board_ids.iter().map(|s| (*s).to_owned()));
        AppState::new(config, Arc::new(registry))
    }

    #[must_use]
    pub fn test_app_state() -> AppState {
        test_app_state_with(Config::default(), &[])
    }

    /// Register a fake connection and return its id and inbox.
    #[must_use]
    pub fn connect(state: &AppState) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let conn = uuid::Uuid::new_v4();
        let (tx, rx) = mpsc::channel(32);
        state.clients.register(conn, tx);
        (conn, rx)
    }

    pub async fn recv_frame(rx: &mut mpsc::Receiver<Frame>) -> Frame {
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("frame receive timed out")
            .expect("channel closed")
    }

    pub async fn assert_no_frame(rx: &mut mpsc::Receiver<Frame>) {
        assert!(
            timeout(Duration::from_millis(50), rx.recv()).await.is_err(),
            "expected channel to remain empty"
        );
    }

    /// Frames already queued, without waiting.
    pub fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
