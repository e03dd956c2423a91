use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::query;
use crate::api::handlers::AppState;
use crate::services::QueryService;

/// Create router with application state
pub fn create_router_with_state(query_service: Arc<QueryService>) -> Router {
    let state = AppState { query_service };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/semantic/query/sql", post(query::query_by_sql))
        .route("/api/semantic/query/struct", post(query::query_by_struct))
        .route(
            "/api/semantic/query/multi-struct",
            post(query::query_by_multi_struct),
        )
        .route(
            "/api/semantic/query/dim-value",
            post(query::query_dim_value),
        )
        .route("/api/semantic/query/explain", post(query::explain))
        .route("/api/semantic/query/item-use", post(query::get_stat_info))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
