//! 两步验证的 HTTP 处理器（作用于当前登录用户）

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::{AppState, ClientIp},
    models::two_factor::{
        DisableTwoFactorRequest, EnableTwoFactorRequest, RecoveryCodesResponse,
        RegenerateRecoveryCodesRequest, VerifyTwoFactorRequest,
    },
};
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

/// 生成待启用的密钥与二维码
pub async fn setup(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let setup = state.two_factor.generate_secret(auth_context.user_id).await?;
    Ok(Json(setup))
}

/// 校验首个验证码后启用
pub async fn enable(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    client_ip: ClientIp,
    Json(req): Json<EnableTwoFactorRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate().map_err(|e| AppError::validation(&e))?;

    let recovery_codes = state
        .two_factor
        .enable(
            auth_context.user_id,
            &req.secret,
            &req.token,
            Some(&client_ip.as_string()),
        )
        .await?;
    Ok(Json(RecoveryCodesResponse { recovery_codes }))
}

/// 关闭（需要当前密码）
pub async fn disable(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    client_ip: ClientIp,
    Json(req): Json<DisableTwoFactorRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate().map_err(|e| AppError::validation(&e))?;

    state
        .two_factor
        .disable(auth_context.user_id, &req.password, Some(&client_ip.as_string()))
        .await?;
    Ok(Json(json!({ "enabled": false })))
}

/// 校验 TOTP 或恢复码
pub async fn verify(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Json(req): Json<VerifyTwoFactorRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate().map_err(|e| AppError::validation(&e))?;

    let valid = state.two_factor.verify(auth_context.user_id, &req.token).await?;
    if !valid {
        return Err(AppError::Unauthorized);
    }
    Ok(Json(json!({ "valid": true })))
}

/// 重新生成恢复码，旧码全部失效
pub async fn regenerate_recovery_codes(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    client_ip: ClientIp,
    Json(req): Json<RegenerateRecoveryCodesRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate().map_err(|e| AppError::validation(&e))?;

    let recovery_codes = state
        .two_factor
        .regenerate_recovery_codes(auth_context.user_id, &req.token, Some(&client_ip.as_string()))
        .await?;
    Ok(Json(RecoveryCodesResponse { recovery_codes }))
}

/// 启用状态与剩余恢复码数量
pub async fn status(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let status = state.two_factor.status(auth_context.user_id).await?;
    Ok(Json(status))
}
