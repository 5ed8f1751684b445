//! Rate limit config and violation repository (限流配置数据访问)

use crate::{
    error::AppError,
    models::rate_limit::{RateLimitConfig, RateLimitViolation},
    repository::store::RateLimitStore,
};
use async_trait::async_trait;
use sqlx::PgPool;

pub struct PgRateLimitRepository {
    db: PgPool,
}

impl PgRateLimitRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RateLimitStore for PgRateLimitRepository {
    async fn find_config(&self, endpoint: &str) -> Result<Option<RateLimitConfig>, AppError> {
        let config = sqlx::query_as::<_, RateLimitConfig>(
            r#"
            SELECT endpoint, window_ms, max_requests, enabled, block_duration_minutes
            FROM rate_limit_configs
            WHERE endpoint = $1
            "#,
        )
        .bind(endpoint)
        .fetch_optional(&self.db)
        .await?;

        Ok(config)
    }

    /// 按 endpoint 插入或覆盖
    async fn upsert_config(&self, config: &RateLimitConfig) -> Result<RateLimitConfig, AppError> {
        let config = sqlx::query_as::<_, RateLimitConfig>(
            r#"
            INSERT INTO rate_limit_configs (endpoint, window_ms, max_requests, enabled, block_duration_minutes)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (endpoint) DO UPDATE
            SET window_ms = EXCLUDED.window_ms,
                max_requests = EXCLUDED.max_requests,
                enabled = EXCLUDED.enabled,
                block_duration_minutes = EXCLUDED.block_duration_minutes
            RETURNING endpoint, window_ms, max_requests, enabled, block_duration_minutes
            "#,
        )
        .bind(&config.endpoint)
        .bind(config.window_ms)
        .bind(config.max_requests)
        .bind(config.enabled)
        .bind(config.block_duration_minutes)
        .fetch_one(&self.db)
        .await?;

        Ok(config)
    }

    async fn delete_config(&self, endpoint: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM rate_limit_configs WHERE endpoint = $1")
            .bind(endpoint)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_configs(&self) -> Result<Vec<RateLimitConfig>, AppError> {
        let configs = sqlx::query_as::<_, RateLimitConfig>(
            r#"
            SELECT endpoint, window_ms, max_requests, enabled, block_duration_minutes
            FROM rate_limit_configs
            ORDER BY endpoint
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(configs)
    }

    async fn insert_violation(&self, violation: &RateLimitViolation) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO rate_limit_violations (ip, endpoint, request_count, request_limit, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&violation.ip)
        .bind(&violation.endpoint)
        .bind(violation.request_count)
        .bind(violation.limit)
        .bind(violation.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn list_violations(&self, limit: i64) -> Result<Vec<RateLimitViolation>, AppError> {
        let violations = sqlx::query_as::<_, RateLimitViolation>(
            r#"
            SELECT ip, endpoint, request_count, request_limit, created_at
            FROM rate_limit_violations
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(violations)
    }
}
