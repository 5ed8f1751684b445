//! 会话管理的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext, error::AppError, middleware::AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub user_id: Option<Uuid>,
}

/// 列出在线会话（可按用户过滤）
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> Result<impl IntoResponse, AppError> {
    let sessions = state.sessions.list_all(query.user_id).await?;
    Ok(Json(json!({
        "sessions": sessions,
        "count": sessions.len()
    })))
}

/// 管理员强制下线单个会话
pub async fn force_logout(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .sessions
        .force_logout(id, Some(auth_context.user_id))
        .await?;
    Ok(Json(json!({ "logged_out": session.id })))
}

/// 管理员强制下线某用户的所有会话
pub async fn force_logout_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let removed = state
        .sessions
        .force_logout_all(user_id, Some(auth_context.user_id))
        .await?;
    Ok(Json(json!({ "user_id": user_id, "logged_out": removed })))
}

/// 当前用户的会话
pub async fn list_my_sessions(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let sessions = state.sessions.list_all(Some(auth_context.user_id)).await?;
    Ok(Json(json!({
        "sessions": sessions,
        "count": sessions.len()
    })))
}

/// 用户结束自己的某个会话
pub async fn logout_my_session(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let owned = state
        .sessions
        .list_all(Some(auth_context.user_id))
        .await?
        .iter()
        .any(|s| s.session.id == id);
    if !owned {
        return Err(AppError::NotFound("Session".to_string()));
    }

    let session = state
        .sessions
        .force_logout(id, Some(auth_context.user_id))
        .await?;
    Ok(Json(json!({ "logged_out": session.id })))
}
