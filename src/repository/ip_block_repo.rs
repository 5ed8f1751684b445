//! Blocked IP repository

use crate::{error::AppError, models::ip_block::BlockedIp, repository::store::BlockedIpStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct PgBlockedIpRepository {
    db: PgPool,
}

impl PgBlockedIpRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BlockedIpStore for PgBlockedIpRepository {
    async fn find(&self, ip: &str) -> Result<Option<BlockedIp>, AppError> {
        let block = sqlx::query_as::<_, BlockedIp>(
            "SELECT ip, reason, expires_at, created_at FROM blocked_ips WHERE ip = $1",
        )
        .bind(ip)
        .fetch_optional(&self.db)
        .await?;

        Ok(block)
    }

    async fn upsert(&self, block: &BlockedIp) -> Result<BlockedIp, AppError> {
        let block = sqlx::query_as::<_, BlockedIp>(
            r#"
            INSERT INTO blocked_ips (ip, reason, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (ip) DO UPDATE
            SET reason = EXCLUDED.reason,
                expires_at = EXCLUDED.expires_at
            RETURNING ip, reason, expires_at, created_at
            "#,
        )
        .bind(&block.ip)
        .bind(&block.reason)
        .bind(block.expires_at)
        .bind(block.created_at)
        .fetch_one(&self.db)
        .await?;

        Ok(block)
    }

    async fn delete(&self, ip: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM blocked_ips WHERE ip = $1")
            .bind(ip)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_if_expired(&self, ip: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM blocked_ips WHERE ip = $1 AND expires_at IS NOT NULL AND expires_at <= $2",
        )
        .bind(ip)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<BlockedIp>, AppError> {
        let blocks = sqlx::query_as::<_, BlockedIp>(
            r#"
            SELECT ip, reason, expires_at, created_at
            FROM blocked_ips
            WHERE expires_at IS NULL OR expires_at > $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(now)
        .fetch_all(&self.db)
        .await?;

        Ok(blocks)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM blocked_ips WHERE expires_at IS NOT NULL AND expires_at <= $1")
            .bind(now)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
