use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::{
    ExplainResp, ExplainSqlReq, ItemUseReq, ItemUseResp, QueryDimValueReq, QueryMultiStructReq,
    QueryResultWithSchema, QuerySqlReq, QueryStructReq, User,
};
use crate::services::QueryService;

#[derive(Clone)]
pub struct AppState {
    pub query_service: Arc<QueryService>,
}

fn user_from_headers(headers: &HeaderMap) -> User {
    let name = headers
        .get("x-user-name")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    User::from_optional_name(name)
}

/// Execute a raw-SQL query
pub async fn query_by_sql(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<QuerySqlReq>,
) -> Result<Json<QueryResultWithSchema>, AppError> {
    if payload.sql.trim().is_empty() {
        return Err(AppError::Validation("SQL query cannot be empty".to_string()));
    }

    let user = user_from_headers(&headers);
    let result = state.query_service.query_by_sql(&payload, &user).await?;
    Ok(Json(result))
}

/// Execute a structured query
pub async fn query_by_struct(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<QueryStructReq>,
) -> Result<Json<Option<QueryResultWithSchema>>, AppError> {
    let user = user_from_headers(&headers);
    let result = state.query_service.query_by_struct(&payload, &user).await?;
    Ok(Json(result))
}

/// Execute several structured queries as one combined statement
pub async fn query_by_multi_struct(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<QueryMultiStructReq>,
) -> Result<Json<Option<QueryResultWithSchema>>, AppError> {
    if payload.query_struct_reqs.is_empty() {
        return Err(AppError::Validation(
            "multi-struct request contains no queries".to_string(),
        ));
    }

    let user = user_from_headers(&headers);
    let result = state
        .query_service
        .query_by_multi_struct(&payload, &user)
        .await?;
    Ok(Json(result))
}

/// Look up the values a dimension takes
pub async fn query_dim_value(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<QueryDimValueReq>,
) -> Result<Json<Option<QueryResultWithSchema>>, AppError> {
    let user = user_from_headers(&headers);
    let result = state
        .query_service
        .query_dim_value(&payload, &user)
        .await?;
    Ok(Json(result))
}

/// Plan a query without executing it and return the corrected SQL
pub async fn explain(
    State(state): State<AppState>,
    Json(payload): Json<ExplainSqlReq>,
) -> Result<Json<ExplainResp>, AppError> {
    let result = state.query_service.explain(&payload).await?;
    Ok(Json(result))
}

/// Per-dimension/metric use counts from the statistics store
pub async fn get_stat_info(
    State(state): State<AppState>,
    Json(payload): Json<ItemUseReq>,
) -> Result<Json<Vec<ItemUseResp>>, AppError> {
    let result = state.query_service.get_stat_info(&payload).await?;
    Ok(Json(result))
}
