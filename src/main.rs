mod config;
mod db;
mod event;
mod frame;
mod routes;
mod services;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::services::registry::{BoardRegistry, MemoryBoardRegistry, PgBoardRegistry};

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Log the outcome of `.env` loading. Returns true when a file exists but
/// could not be loaded.
fn report_dotenv(result: &Result<PathBuf, dotenvy::Error>) -> bool {
    match result {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded .env");
            false
        }
        Err(e) if e.not_found() => {
            tracing::debug!("no .env file found");
            false
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to load .env");
            true
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Loaded before the subscriber so `.env` can set RUST_LOG; reported after.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("drawroom=info,tower_http=info")),
        )
        .init();

    report_dotenv(&dotenv);

    let config = Config::from_env();

    let registry: Arc<dyn BoardRegistry> = if let Some(url) = config.database_url.as_deref() {
        let pool = db::init_pool(url).await?;
        Arc::new(PgBoardRegistry::new(pool))
    } else {
        tracing::warn!(boards = config.board_ids.len(), "DATABASE_URL not set; short ids resolve against BOARD_IDS only");
        Arc::new(MemoryBoardRegistry::new(config.board_ids.clone()))
    };

    let port = config.port;
    let state = state::AppState::new(config, registry);

    // Spawn background idle sweep.
    let _sweep = services::sweep::spawn_sweep_task(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, "drawroom listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dotenv_is_not_a_problem() {
        let missing = Err(dotenvy::Error::Io(std::io::Error::from(std::io::ErrorKind::NotFound)));
        assert!(!report_dotenv(&missing));
        assert!(!report_dotenv(&Ok(PathBuf::from(".env"))));
    }

    #[test]
    fn malformed_dotenv_is_reported() {
        let malformed = Err(dotenvy::Error::LineParse("KEY VALUE".into(), 3));
        assert!(report_dotenv(&malformed));
    }
}
