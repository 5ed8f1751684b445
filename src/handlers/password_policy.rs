//! 密码策略的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext, error::AppError, middleware::AppState,
    models::password_policy::UpdatePasswordPolicyRequest,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ValidatePasswordRequest {
    #[validate(length(min = 1, max = 1024))]
    pub password: String,
    pub user_id: Option<Uuid>,
}

/// 当前策略
pub async fn get_policy(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let policy = state.password_policy.get_policy().await?;
    Ok(Json(policy))
}

/// 替换策略
pub async fn update_policy(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Json(req): Json<UpdatePasswordPolicyRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate().map_err(|e| AppError::validation(&e))?;

    let policy = state
        .password_policy
        .update_policy(req.into_policy(Some(auth_context.user_id)), Some(auth_context.user_id))
        .await?;
    Ok(Json(policy))
}

/// 校验候选密码，返回全部不满足的规则
pub async fn validate_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidatePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate().map_err(|e| AppError::validation(&e))?;

    let result = state
        .password_policy
        .validate(&req.password, req.user_id)
        .await?;
    Ok(Json(result))
}

/// 用户密码是否已过期
pub async fn password_expiry(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let expired = state.password_policy.is_expired(user_id).await?;
    Ok(Json(json!({ "user_id": user_id, "expired": expired })))
}
