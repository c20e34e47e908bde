//! Trains a snapshot from the Postgres catalog and uploads it to the blob store.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use hybrid_recommender::{
    config::Config,
    db::{create_pool, PgCatalogSource},
    services::{storage, train_from_source},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hybrid_recommender=info")),
        )
        .init();

    let config = Config::from_env()?;
    let training = config.training_config()?;
    let store = config
        .blob_store()
        .context("SNAPSHOT_STORE_URL or SNAPSHOT_DIR must be set to store the snapshot")?;

    let pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to the catalog database")?;
    let source = PgCatalogSource::new(pool);

    let engine = Arc::new(train_from_source(&source, &training).await?);

    let k = config.evaluation_k;
    let evaluated = Arc::clone(&engine);
    let report = tokio::task::spawn_blocking(move || evaluated.evaluate(k)).await??;
    tracing::info!(
        k,
        precision = report.precision,
        map = report.map,
        ndcg = report.ndcg,
        users = report.users_evaluated,
        "Held-out evaluation"
    );

    storage::save_remote(store.as_ref(), &config.snapshot_key, &engine).await?;
    tracing::info!(
        key = %config.snapshot_key,
        snapshot_id = %engine.snapshot_id(),
        "Snapshot published"
    );
    Ok(())
}
