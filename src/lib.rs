pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod pdf_cache;
pub mod pipeline;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::api::ApiContext;
use crate::config::AppConfig;
use crate::db::SqliteStore;
use crate::pipeline::generation::GeminiClient;

/// Initialize tracing, wire the pipeline and serve until Ctrl-C.
pub async fn run() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env().map_err(|e| e.to_string())?;

    if let Some(parent) = config.server.db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Cannot create data directory {}: {e}", parent.display()))?;
    }
    let store = Arc::new(
        SqliteStore::open(&config.server.db_path).map_err(|e| format!("Database: {e}"))?,
    );
    tracing::info!(path = %config.server.db_path.display(), "Database opened");

    if config.generation.api_key.is_none() {
        tracing::warn!("No AI API key configured; generation requests will fail until one is set");
    }
    let client = GeminiClient::new(
        &config.generation.base_url,
        config.generation.api_key.clone(),
        &config.generation.model,
        config.generation.attempt_timeout,
    )
    .map_err(|e| e.to_string())?;
    tracing::info!(model = client.model(), "Generation client ready");

    let ctx = ApiContext::from_store(store, Arc::new(client), &config);
    let persist_pdfs = ctx.pdf_cache.persists();
    let server = api::start_server(ctx, config.server.bind_addr).await?;
    tracing::info!(
        addr = %server.addr,
        persist_pdfs,
        "Serving history API"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    server.stop().await;

    Ok(())
}
