//! Board registry — short-code resolution against persisted boards.
//!
//! DESIGN
//! ======
//! Boards are shared by a 6-character code: the tail of the full board id.
//! On join, a candidate of exactly that length is looked up by suffix; a
//! match substitutes the canonical id. Anything else passes through.
//!
//! ERROR HANDLING
//! ==============
//! Resolution is best effort and never blocks a join. A miss keeps the
//! original id; a lookup failure is logged and also keeps the original id.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, warn};

/// Length of the human-shareable board code.
pub const SHORT_ID_LEN: usize = 6;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read-only lookup over persisted board records.
#[async_trait]
pub trait BoardRegistry: Send + Sync {
    /// Full id of a persisted board whose id ends with `suffix`.
    async fn find_by_suffix(&self, suffix: &str) -> Result<Option<String>, RegistryError>;
}

// =============================================================================
// RESOLUTION
// =============================================================================

#[must_use]
pub fn is_short_id(candidate: &str) -> bool {
    candidate.chars().count() == SHORT_ID_LEN
}

/// Resolve a board id as sent by a client to its canonical form.
///
/// Performs at most one registry call, and only for short-form candidates.
pub async fn resolve_board_id(registry: &dyn BoardRegistry, candidate: &str) -> String {
    if !is_short_id(candidate) {
        return candidate.to_owned();
    }

    match registry.find_by_suffix(candidate).await {
        Ok(Some(full)) => {
            debug!(short = %candidate, board_id = %full, "registry: resolved short id");
            full
        }
        Ok(None) => {
            debug!(short = %candidate, "registry: no board for short id");
            candidate.to_owned()
        }
        Err(e) => {
            warn!(error = %e, short = %candidate, "registry: lookup failed; using id verbatim");
            candidate.to_owned()
        }
    }
}

// =============================================================================
// POSTGRES
// =============================================================================

/// Registry backed by the `boards` table.
pub struct PgBoardRegistry {
    pool: PgPool,
}

impl PgBoardRegistry {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// The literal 6 matches SHORT_ID_LEN and the `boards_short_code_idx` index.
#[async_trait]
impl BoardRegistry for PgBoardRegistry {
    async fn find_by_suffix(&self, suffix: &str) -> Result<Option<String>, RegistryError> {
        let id = sqlx::query_scalar::<_, String>(
            "SELECT id FROM boards
             WHERE right(id, 6) = $1
             ORDER BY created_at ASC
             LIMIT 1",
        )
        .bind(suffix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

/// Registry over a fixed, process-local list of board ids. Used when no
/// database is configured, and by tests.
#[derive(Debug, Default)]
pub struct MemoryBoardRegistry {
    ids: Vec<String>,
}

impl MemoryBoardRegistry {
    #[must_use]
    pub fn new(ids: impl IntoIterator<Item = String>) -> Self {
        Self { ids: ids.into_iter().collect() }
    }
}

#[async_trait]
impl BoardRegistry for MemoryBoardRegistry {
    async fn find_by_suffix(&self, suffix: &str) -> Result<Option<String>, RegistryError> {
        Ok(self.ids.iter().find(|id| id.ends_with(suffix)).cloned())
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
