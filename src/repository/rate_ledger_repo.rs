//! Shared rate ledger on PostgreSQL (多实例部署)

use crate::{error::AppError, models::rate_limit::LedgerStats, services::rate_ledger::RateLedger};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};

pub struct PgRateLedger {
    db: PgPool,
}

impl PgRateLedger {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RateLedger for PgRateLedger {
    async fn record_hit(
        &self,
        ip: &str,
        endpoint: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<usize, AppError> {
        let mut tx = self.db.begin().await?;

        // 同一 (ip, endpoint) 的计数串行化, 锁随事务释放
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || '|' || $2))")
            .bind(ip)
            .bind(endpoint)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO rate_ledger_hits (ip, endpoint, hit_at) VALUES ($1, $2, $3)")
            .bind(ip)
            .bind(endpoint)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let cutoff = now - window;
        sqlx::query("DELETE FROM rate_ledger_hits WHERE ip = $1 AND endpoint = $2 AND hit_at < $3")
            .bind(ip)
            .bind(endpoint)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        let count: i64 = sqlx::query(
            "SELECT COUNT(*) FROM rate_ledger_hits WHERE ip = $1 AND endpoint = $2 AND hit_at >= $3",
        )
        .bind(ip)
        .bind(endpoint)
        .bind(cutoff)
        .fetch_one(&mut *tx)
        .await?
        .get(0);

        tx.commit().await?;

        Ok(count.max(0) as usize)
    }

    /// 删除长时间无访问的 key, 返回 key 数而非行数
    async fn collect_idle(&self, now: DateTime<Utc>, idle: Duration) -> Result<usize, AppError> {
        let removed_keys: i64 = sqlx::query_scalar(
            r#"
            WITH removed AS (
                DELETE FROM rate_ledger_hits h
                USING (
                    SELECT ip, endpoint
                    FROM rate_ledger_hits
                    GROUP BY ip, endpoint
                    HAVING MAX(hit_at) < $1
                ) idle
                WHERE h.ip = idle.ip AND h.endpoint = idle.endpoint
                RETURNING h.ip, h.endpoint
            )
            SELECT COUNT(DISTINCT (ip, endpoint)) FROM removed
            "#,
        )
        .bind(now - idle)
        .fetch_one(&self.db)
        .await?;

        Ok(removed_keys.max(0) as usize)
    }

    async fn stats(&self) -> Result<LedgerStats, AppError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(DISTINCT ip) AS tracked_ips,
                COUNT(DISTINCT (ip, endpoint)) AS tracked_keys
            FROM rate_ledger_hits
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let tracked_ips: i64 = row.try_get("tracked_ips")?;
        let tracked_keys: i64 = row.try_get("tracked_keys")?;

        Ok(LedgerStats {
            tracked_ips: tracked_ips.max(0) as usize,
            tracked_keys: tracked_keys.max(0) as usize,
        })
    }
}
