//! 安全面板

use crate::{auth::middleware::AuthContext, error::AppError, middleware::AppState};
use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;

/// 面板概览（含风险评估）
pub async fn overview(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let overview = state.risk.dashboard_overview(auth_context.user_id).await?;
    Ok(Json(overview))
}

/// 仅风险评估
pub async fn risk_assessment(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let assessment = state.risk.assess().await?;
    Ok(Json(assessment))
}
