//! 文件完整性的 HTTP 处理器

use crate::{auth::middleware::AuthContext, error::AppError, middleware::AppState};
use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;

/// 重新生成基线
pub async fn generate_baseline(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.integrity.generate_baseline().await?;
    tracing::info!(
        admin = %auth_context.username,
        files = summary.file_count,
        "Integrity baseline regenerated via API"
    );
    Ok(Json(summary))
}

/// 与基线比对
pub async fn scan(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let report = state.integrity.scan_for_changes().await?;
    Ok(Json(report))
}
