/// End-to-end training: load catalog data, preprocess, fit
use crate::{
    error::{AppError, AppResult},
    services::{
        catalog::CatalogSource,
        recommender::{preprocess, AlsParams, PreprocessConfig, RecommenderEngine},
    },
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingConfig {
    pub preprocess: PreprocessConfig,
    pub als: AlsParams,
    pub content_weight: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            als: AlsParams::default(),
            content_weight: 0.25,
        }
    }
}

/// Trains a fresh engine from `source`
///
/// Preprocessing and factorization run on the blocking pool.
pub async fn train_from_source(
    source: &dyn CatalogSource,
    config: &TrainingConfig,
) -> AppResult<RecommenderEngine> {
    let data = source.load_all().await?;
    let config = *config;

    let engine = tokio::task::spawn_blocking(move || {
        let prepared = preprocess(&data, &config.preprocess)?;
        RecommenderEngine::train(prepared, config.als, config.content_weight)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Training task failed: {}", e)))??;

    tracing::info!(
        source = source.name(),
        snapshot_id = %engine.snapshot_id(),
        "Training finished"
    );
    Ok(engine)
}
