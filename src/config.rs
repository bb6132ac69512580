//! Process configuration loaded from the environment.
//!
//! DESIGN
//! ======
//! Every knob has a default so the coordinator starts with an empty
//! environment. Unparsable values fall back to the default instead of
//! aborting startup.

use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_CLIENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_ROOM_IDLE_TTL_SECS: u64 = 0;
const DEFAULT_ROOM_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Postgres URL for the board registry. `None` selects the in-memory registry.
    pub database_url: Option<String>,
    /// Board ids known to the in-memory registry.
    pub board_ids: Vec<String>,
    /// Outbound queue depth per connection. Frames to a full queue are dropped.
    pub client_channel_capacity: usize,
    /// Also drop drawing membership and host binding when a connection closes.
    pub prune_drawing_on_disconnect: bool,
    /// Idle boards older than this are evicted. `None` disables eviction.
    pub room_idle_ttl: Option<Duration>,
    pub room_sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            board_ids: Vec::new(),
            client_channel_capacity: DEFAULT_CLIENT_CHANNEL_CAPACITY,
            prune_drawing_on_disconnect: false,
            room_idle_ttl: None,
            room_sweep_interval: Duration::from_secs(DEFAULT_ROOM_SWEEP_INTERVAL_SECS),
        }
    }
}

impl Config {
    /// Build config from environment variables.
    ///
    /// - `PORT`
    /// - `DATABASE_URL`
    /// - `BOARD_IDS`: comma-separated ids for the in-memory registry
    /// - `CLIENT_CHANNEL_CAPACITY`
    /// - `PRUNE_DRAWING_ON_DISCONNECT`: `true`/`1` to enable
    /// - `ROOM_IDLE_TTL_SECS`: `0` disables eviction
    /// - `ROOM_SWEEP_INTERVAL_SECS`
    #[must_use]
    pub fn from_env() -> Self {
        let idle_ttl_secs = env_parse("ROOM_IDLE_TTL_SECS", DEFAULT_ROOM_IDLE_TTL_SECS);
        let sweep_secs = env_parse("ROOM_SWEEP_INTERVAL_SECS", DEFAULT_ROOM_SWEEP_INTERVAL_SECS).max(1);

        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            board_ids: std::env::var("BOARD_IDS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            client_channel_capacity: env_parse("CLIENT_CHANNEL_CAPACITY", DEFAULT_CLIENT_CHANNEL_CAPACITY).max(1),
            prune_drawing_on_disconnect: env_flag("PRUNE_DRAWING_ON_DISCONNECT"),
            room_idle_ttl: (idle_ttl_secs > 0).then(|| Duration::from_secs(idle_ttl_secs)),
            room_sweep_interval: Duration::from_secs(sweep_secs),
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
