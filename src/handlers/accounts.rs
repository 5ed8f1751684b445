//! 账号锁定的 HTTP 处理器

use crate::{auth::middleware::AuthContext, error::AppError, middleware::AppState};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct LockAccountRequest {
    pub until: DateTime<Utc>,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

/// 锁定账号
pub async fn lock_account(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(user_id): Path<Uuid>,
    Json(req): Json<LockAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate().map_err(|e| AppError::validation(&e))?;
    if req.until <= Utc::now() {
        return Err(AppError::Validation("until must be in the future".to_string()));
    }

    state
        .lockout
        .lock(user_id, req.until, &req.reason, Some(auth_context.user_id))
        .await?;
    Ok(Json(json!({ "user_id": user_id, "locked_until": req.until })))
}

/// 解锁账号
pub async fn unlock_account(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .lockout
        .unlock(user_id, Some(auth_context.user_id))
        .await?;
    Ok(Json(json!({ "user_id": user_id, "locked_until": null })))
}
