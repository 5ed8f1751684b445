//! 安全存储的 PostgreSQL 连接
//! 建池 + 迁移、表结构就绪检查、连接池指标

use crate::config::DatabaseConfig;
use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// 迁移创建的全部表；就绪检查逐一确认存在
pub const SECURITY_TABLES: &[&str] = &[
    "users",
    "security_events",
    "blocked_ips",
    "rate_limit_configs",
    "rate_limit_violations",
    "rate_ledger_hits",
    "password_policy",
    "password_history",
    "sessions",
    "integrity_baseline",
];

/// 建立连接池并执行迁移
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .test_before_acquire(true)
        .connect(config.url.expose_secret())
        .await
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| DbError::MigrationFailed(e.to_string()))?;

    record_pool_metrics(&pool);
    tracing::info!(
        max_connections = config.max_connections,
        tables = SECURITY_TABLES.len(),
        "Security store connected and migrated"
    );

    Ok(pool)
}

/// 数据库可达且迁移后的表都在
pub async fn check_schema(pool: &PgPool) -> SchemaHealth {
    let missing: Result<Vec<String>, sqlx::Error> = sqlx::query_scalar(
        "SELECT t FROM unnest($1::text[]) AS t WHERE to_regclass('public.' || t) IS NULL",
    )
    .bind(SECURITY_TABLES)
    .fetch_all(pool)
    .await;

    match missing {
        Ok(missing) if missing.is_empty() => SchemaHealth::Ready,
        Ok(missing) => {
            tracing::warn!(missing = ?missing, "Security tables missing");
            SchemaHealth::MissingTables(missing)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Database readiness check failed");
            SchemaHealth::Unreachable(e.to_string())
        }
    }
}

pub fn record_pool_metrics(pool: &PgPool) {
    metrics::gauge!("trust_core_db_pool_size").set(pool.size() as f64);
    metrics::gauge!("trust_core_db_pool_idle").set(pool.num_idle() as f64);
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaHealth {
    Ready,
    MissingTables(Vec<String>),
    Unreachable(String),
}

impl SchemaHealth {
    pub fn is_ready(&self) -> bool {
        matches!(self, SchemaHealth::Ready)
    }

    pub fn message(&self) -> Option<String> {
        match self {
            SchemaHealth::Ready => None,
            SchemaHealth::MissingTables(tables) => {
                Some(format!("missing tables: {}", tables.join(", ")))
            }
            SchemaHealth::Unreachable(msg) => Some(msg.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_health_message() {
        assert!(SchemaHealth::Ready.is_ready());
        assert_eq!(SchemaHealth::Ready.message(), None);

        let missing = SchemaHealth::MissingTables(vec![
            "rate_ledger_hits".to_string(),
            "sessions".to_string(),
        ]);
        assert!(!missing.is_ready());
        assert_eq!(
            missing.message().as_deref(),
            Some("missing tables: rate_ledger_hits, sessions")
        );

        let down = SchemaHealth::Unreachable("Connection refused".to_string());
        assert_eq!(down.message().as_deref(), Some("Connection refused"));
    }

    #[test]
    fn test_security_tables_cover_ledger() {
        assert!(SECURITY_TABLES.contains(&"rate_ledger_hits"));
        assert!(SECURITY_TABLES.contains(&"blocked_ips"));
    }
}
