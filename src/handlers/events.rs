//! 安全事件的 HTTP 处理器

use crate::{
    error::AppError,
    middleware::AppState,
    models::security_event::{SecurityEventFilters, SecurityEventType},
};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SecurityEventQuery {
    pub user_id: Option<Uuid>,
    pub event_type: Option<SecurityEventType>,
    /// 逗号分隔，例如 `LOGIN_FAILED,ACCOUNT_LOCKED`
    pub event_types: Option<String>,
    pub ip: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    #[serde(default = "default_hours")]
    pub hours: i64,
}

fn default_hours() -> i64 {
    24
}

fn parse_event_types(raw: &str) -> Result<Vec<SecurityEventType>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<SecurityEventType>().map_err(AppError::Validation))
        .collect()
}

/// 查询安全事件
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SecurityEventQuery>,
) -> Result<impl IntoResponse, AppError> {
    let event_types = query
        .event_types
        .as_deref()
        .map(parse_event_types)
        .transpose()?;

    let filters = SecurityEventFilters {
        user_id: query.user_id,
        event_type: query.event_type,
        event_types,
        ip: query.ip,
        start_time: query.start_time,
        end_time: query.end_time,
    };

    let page = state
        .events
        .query(&filters, query.limit, query.offset.max(0))
        .await?;
    Ok(Json(page))
}

/// 时间窗口内的统计
pub async fn statistics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatisticsQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !(1..=24 * 365).contains(&query.hours) {
        return Err(AppError::Validation("hours must be between 1 and 8760".to_string()));
    }
    let stats = state.events.statistics(query.hours).await?;
    Ok(Json(stats))
}
