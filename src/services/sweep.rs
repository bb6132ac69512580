//! Idle sweep — optional eviction of abandoned boards.
//!
//! DESIGN
//! ======
//! Boards are never removed by joins or disconnects, so a long-running
//! process accumulates every board it has ever seen. When
//! `ROOM_IDLE_TTL_SECS` is set, a background task wakes on an interval and
//! evicts boards that have been idle for the TTL and that no live connection
//! holds a role in. An evicted board loses its snapshot and starts unseeded
//! on the next join.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

use crate::state::AppState;

/// Spawn the sweep task. Returns `None` when eviction is disabled.
pub fn spawn_sweep_task(state: AppState) -> Option<JoinHandle<()>> {
    let ttl = state.config.room_idle_ttl?;
    let period = state.config.room_sweep_interval;
    info!(ttl_secs = ttl.as_secs(), period_secs = period.as_secs(), "sweep: idle eviction enabled");

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            sweep_once(&state, ttl, Instant::now()).await;
        }
    }))
}

/// Evict idle, abandoned boards as of `now`. Returns the evicted ids.
pub async fn sweep_once(state: &AppState, ttl: Duration, now: Instant) -> Vec<String> {
    // Collect live connections first; the client registry lock is never
    // taken while the room index is write-locked.
    let connected = state.clients.connected_ids();
    let evicted = state.rooms.evict_idle(ttl, now, &connected).await;

    if !evicted.is_empty() {
        let remaining = state.rooms.len().await;
        info!(count = evicted.len(), remaining, "sweep: evicted idle boards");
    }
    evicted
}

#[cfg(test)]
#[path = "sweep_test.rs"]
mod tests;
