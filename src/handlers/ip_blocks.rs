//! IP 封禁的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext, error::AppError, middleware::AppState,
    models::ip_block::BlockIpRequest,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::{net::IpAddr, sync::Arc};
use validator::Validate;

/// 列出生效中的封禁
pub async fn list_blocks(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let blocks = state.ip_blocks.list_active().await?;
    Ok(Json(json!({
        "blocks": blocks,
        "count": blocks.len()
    })))
}

/// 手动封禁
pub async fn block_ip(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Json(req): Json<BlockIpRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate().map_err(|e| AppError::validation(&e))?;

    // 统一为规范格式，闸门按 IpAddr::to_string 比对
    let ip: IpAddr = req
        .ip
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("Invalid IP address: {}", req.ip)))?;

    let block = state
        .ip_blocks
        .block(&ip.to_string(), &req.reason, req.expires_at, Some(auth_context.user_id))
        .await?;

    Ok((StatusCode::CREATED, Json(block)))
}

/// 解除封禁
pub async fn unblock_ip(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(ip): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.ip_blocks.unblock(&ip, Some(auth_context.user_id)).await?;
    Ok(Json(json!({ "unblocked": ip })))
}
