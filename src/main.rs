use anyhow::Context;
use tracing_subscriber::EnvFilter;

use hybrid_recommender::{
    api::{create_router, AppState},
    config::Config,
    db::{create_redis_client, Cache},
    services::storage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hybrid_recommender=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let store = config
        .blob_store()
        .context("SNAPSHOT_STORE_URL or SNAPSHOT_DIR must be set to load a snapshot")?;
    let engine = storage::load_remote(
        store.as_ref(),
        &config.snapshot_key,
        config.storage_timeout(),
    )
    .await
    .context("Failed to load the initial snapshot")?;
    tracing::info!(info = ?engine.info(), "Engine ready");

    let mut state = AppState::new(engine)
        .with_blob_store(store, config.snapshot_key.clone(), config.storage_timeout())
        .with_cors_origin(config.cors_origin.clone());

    let mut cache_handle = None;
    if let Some(redis_url) = &config.redis_url {
        let client = create_redis_client(redis_url)?;
        let (cache, handle) = Cache::new(client).await;
        state = state.with_cache(cache);
        cache_handle = Some(handle);
        tracing::info!("Response cache enabled");
    }

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_handle {
        handle.shutdown().await;
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
