//! 限流配置的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::AppState,
    models::rate_limit::{RateLimitConfig, UpsertRateLimitRequest},
};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct EndpointQuery {
    pub endpoint: String,
}

#[derive(Debug, Deserialize)]
pub struct ViolationQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// 列出全部限流配置
pub async fn list_configs(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let configs = state.rate_limiter.list_configs().await?;
    Ok(Json(json!({
        "configs": configs,
        "count": configs.len()
    })))
}

/// 新增或覆盖端点配置
pub async fn upsert_config(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Json(req): Json<UpsertRateLimitRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate().map_err(|e| AppError::validation(&e))?;

    let saved = state
        .rate_limiter
        .upsert_config(RateLimitConfig::from(req))
        .await?;

    tracing::info!(
        admin = %auth_context.username,
        endpoint = %saved.endpoint,
        "Rate limit config updated via API"
    );

    Ok(Json(saved))
}

/// 删除端点配置
pub async fn delete_config(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EndpointQuery>,
) -> Result<impl IntoResponse, AppError> {
    state.rate_limiter.delete_config(&query.endpoint).await?;
    Ok(Json(json!({ "deleted": query.endpoint })))
}

/// 最近的超限记录
pub async fn list_violations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViolationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let violations = state.rate_limiter.list_violations(query.limit).await?;
    let ledger = state.rate_limiter.ledger_stats().await?;

    Ok(Json(json!({
        "violations": violations,
        "count": violations.len(),
        "ledger": ledger
    })))
}
