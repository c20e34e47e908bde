use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::AppState;
use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.cors_origin.as_deref());

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(cors),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:user_id/recommendations",
            get(handlers::get_recommendations),
        )
        .route(
            "/users/:user_id/explanations/:movie_id",
            get(handlers::get_explanation),
        )
        .route("/movies/:movie_id", get(handlers::get_movie))
        .route("/evaluation", get(handlers::get_evaluation))
        .route("/snapshot", get(handlers::get_snapshot))
        .route("/snapshot/reload", post(handlers::reload_snapshot))
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Ignoring invalid CORS origin");
            layer
        }
        None => layer,
    }
}
