use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use emb::config::{Cli, Config};
use emb::images::{POST_IMAGE_DIR, PROFILE_IMAGE_DIR};
use emb::state::AppState;
use emb::{auth, db, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure upload directories exist
    let uploads = config.uploads_path();
    std::fs::create_dir_all(uploads.join(PROFILE_IMAGE_DIR))?;
    std::fs::create_dir_all(uploads.join(POST_IMAGE_DIR))?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;
    {
        let conn = pool.get()?;
        let purged = auth::session::purge_expired(&conn)?;
        if purged > 0 {
            tracing::info!(purged, "Removed expired sessions");
        }
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState::new(pool, config)?;
    let app = routes::router(state);

    // Start server
    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
