use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    cached,
    db::CacheKey,
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{MovieInfo, RawId, SnapshotInfo},
    services::{recommender::RecommenderEngine, storage},
};

use super::AppState;

const RESPONSE_CACHE_TTL: u64 = 3600; // 1 hour
const DEFAULT_N: usize = 10;
const MAX_N: usize = 100;
const DEFAULT_K: usize = 10;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    pub n: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluationQuery {
    pub k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReloadRequest {
    /// Object to load instead of the configured snapshot key
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedMovie {
    pub movie_id: RawId,
    pub score: f32,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationsResponse {
    pub user_id: RawId,
    pub snapshot_id: Uuid,
    pub recommendations: Vec<RecommendedMovie>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationResponse {
    pub user_id: RawId,
    pub movie_id: RawId,
    pub explanation: String,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub previous_snapshot_id: Uuid,
    pub snapshot: SnapshotInfo,
}

// Handlers

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let engine = state.engine.current().await;
    Json(json!({ "status": "healthy", "snapshot_id": engine.snapshot_id() }))
}

/// Top-N hybrid recommendations for a user
pub async fn get_recommendations(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(user_id): Path<RawId>,
    Query(query): Query<RecommendationsQuery>,
) -> AppResult<Json<RecommendationsResponse>> {
    let n = query.n.unwrap_or(DEFAULT_N);
    if !(1..=MAX_N).contains(&n) {
        return Err(AppError::InvalidInput(format!("n must be between 1 and {}, got {}", MAX_N, n)));
    }

    let engine = state.engine.current().await;
    let response = recommendations_response(&state, engine, user_id, n).await?;

    tracing::info!(
        request_id = %request_id,
        user_id,
        n,
        returned = response.recommendations.len(),
        "Recommendations served"
    );
    Ok(Json(response))
}

/// Why a movie is recommended to a user
pub async fn get_explanation(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((user_id, movie_id)): Path<(RawId, RawId)>,
) -> AppResult<Json<ExplanationResponse>> {
    let engine = state.engine.current().await;
    let response = explanation_response(&state, engine, user_id, movie_id).await?;

    tracing::info!(request_id = %request_id, user_id, movie_id, "Explanation served");
    Ok(Json(response))
}

/// Catalog details for a movie
pub async fn get_movie(
    State(state): State<AppState>,
    Path(movie_id): Path<RawId>,
) -> AppResult<Json<MovieInfo>> {
    let engine = state.engine.current().await;
    let info = engine.movie_info(movie_id)?.clone();
    Ok(Json(info))
}

/// Offline ranking metrics of the active snapshot
pub async fn get_evaluation(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<EvaluationQuery>,
) -> AppResult<Json<BTreeMap<String, f64>>> {
    let k = query.k.unwrap_or(DEFAULT_K);
    if k == 0 {
        return Err(AppError::InvalidInput("k must be at least 1".to_string()));
    }

    let engine = state.engine.current().await;
    let metrics = evaluation_metrics(&state, engine, k).await?;

    tracing::info!(request_id = %request_id, k, "Evaluation served");
    Ok(Json(metrics))
}

/// Metadata of the active snapshot
pub async fn get_snapshot(State(state): State<AppState>) -> Json<SnapshotInfo> {
    Json(state.engine.current().await.info())
}

/// Fetches a snapshot from the blob store and swaps it in
pub async fn reload_snapshot(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Option<Json<ReloadRequest>>,
) -> AppResult<Json<ReloadResponse>> {
    let store = state.blob_store.clone().ok_or_else(|| {
        AppError::ServiceUnavailable("No snapshot store is configured".to_string())
    })?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let key = request.key.unwrap_or_else(|| state.snapshot_key.clone());

    let engine = storage::load_remote(store.as_ref(), &key, state.storage_timeout).await?;
    let snapshot = engine.info();
    let previous = state.engine.swap(engine).await;

    tracing::info!(
        request_id = %request_id,
        key = %key,
        previous_snapshot_id = %previous.snapshot_id(),
        snapshot_id = %snapshot.snapshot_id,
        "Snapshot reloaded"
    );

    Ok(Json(ReloadResponse {
        previous_snapshot_id: previous.snapshot_id(),
        snapshot,
    }))
}

// Cache-aware computations

async fn recommendations_response(
    state: &AppState,
    engine: Arc<RecommenderEngine>,
    user_id: RawId,
    n: usize,
) -> AppResult<RecommendationsResponse> {
    let key = CacheKey::Recommendations {
        snapshot: engine.snapshot_id(),
        user: user_id,
        n,
    };
    match &state.cache {
        Some(cache) => cached!(cache, key, RESPONSE_CACHE_TTL, async {
            build_recommendations(&engine, user_id, n)
        }),
        None => build_recommendations(&engine, user_id, n),
    }
}

fn build_recommendations(
    engine: &RecommenderEngine,
    user_id: RawId,
    n: usize,
) -> AppResult<RecommendationsResponse> {
    let recommendations = engine
        .recommend_hybrid(user_id, n)?
        .into_iter()
        .map(|rec| -> AppResult<RecommendedMovie> {
            let title = engine.movie_info(rec.movie_id)?.title.clone();
            Ok(RecommendedMovie {
                movie_id: rec.movie_id,
                score: rec.score,
                title,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(RecommendationsResponse {
        user_id,
        snapshot_id: engine.snapshot_id(),
        recommendations,
    })
}

async fn explanation_response(
    state: &AppState,
    engine: Arc<RecommenderEngine>,
    user_id: RawId,
    movie_id: RawId,
) -> AppResult<ExplanationResponse> {
    let build = || -> AppResult<ExplanationResponse> {
        Ok(ExplanationResponse {
            user_id,
            movie_id,
            explanation: engine.explain(user_id, movie_id)?,
        })
    };

    let key = CacheKey::Explanation {
        snapshot: engine.snapshot_id(),
        user: user_id,
        movie: movie_id,
    };
    match &state.cache {
        Some(cache) => cached!(cache, key, RESPONSE_CACHE_TTL, async { build() }),
        None => build(),
    }
}

async fn evaluation_metrics(
    state: &AppState,
    engine: Arc<RecommenderEngine>,
    k: usize,
) -> AppResult<BTreeMap<String, f64>> {
    let key = CacheKey::Evaluation {
        snapshot: engine.snapshot_id(),
        k,
    };
    // scores every user; keep it off the async workers
    let compute = move || async move {
        tokio::task::spawn_blocking(move || engine.evaluate(k))
            .await
            .map_err(|e| AppError::Internal(format!("Evaluation task failed: {}", e)))?
            .map(|report| report.as_map())
            .map_err(AppError::from)
    };

    match &state.cache {
        Some(cache) => cached!(cache, key, RESPONSE_CACHE_TTL, compute()),
        None => compute().await,
    }
}
