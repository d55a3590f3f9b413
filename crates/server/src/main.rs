use std::sync::Arc;
use anyhow::Result;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use parley_server::api;
use parley_server::config::Config;
use parley_server::provider::gemini::GeminiProvider;
use parley_server::state::AppState;
use parley_shared::db::Db;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(model = %config.gemini.model, "Starting Parley");

    let db = Db::open(&config.database_path)?;
    tracing::info!("Using database at {}", config.database_path.display());

    let provider = Arc::new(GeminiProvider::new(config.gemini.clone())?);
    let state = AppState::new(db, provider);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = api::create_router(state);
    let bind_addr = config.bind_addr.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::start_server(&bind_addr, app, shutdown_rx).await {
            tracing::error!("API server crashed: {:#}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal...");

    let _ = shutdown_tx.send(true);
    let _ = api_handle.await;

    tracing::info!("Parley shutdown complete.");
    Ok(())
}
