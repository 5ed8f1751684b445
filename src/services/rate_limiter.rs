//! 限流服务
//! Sliding-window log per (ip, endpoint) with escalation to an IP block

use crate::{
    error::AppError,
    models::rate_limit::{
        LedgerStats, RateLimitConfig, RateLimitDecision, RateLimitViolation, GLOBAL_ENDPOINT,
    },
    repository::store::RateLimitStore,
    services::{ip_block_service::IpBlockRegistry, rate_ledger::RateLedger},
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    ledger: Arc<dyn RateLedger>,
    blocks: Arc<IpBlockRegistry>,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        ledger: Arc<dyn RateLedger>,
        blocks: Arc<IpBlockRegistry>,
    ) -> Self {
        Self {
            store,
            ledger,
            blocks,
        }
    }

    /// Endpoint row, else the global row
    pub async fn resolve_config(&self, endpoint: &str) -> Result<Option<RateLimitConfig>, AppError> {
        if let Some(config) = self.store.find_config(endpoint).await? {
            return Ok(Some(config));
        }
        if endpoint == GLOBAL_ENDPOINT {
            return Ok(None);
        }
        self.store.find_config(GLOBAL_ENDPOINT).await
    }

    pub async fn check(&self, ip: &str, endpoint: &str) -> Result<RateLimitDecision, AppError> {
        self.check_at(ip, endpoint, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        ip: &str,
        endpoint: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, AppError> {
        let Some(config) = self.resolve_config(endpoint).await? else {
            return Ok(RateLimitDecision::allow());
        };
        if !config.enabled {
            return Ok(RateLimitDecision::allow());
        }

        let count = self
            .ledger
            .record_hit(ip, endpoint, now, Duration::milliseconds(config.window_ms))
            .await?;
        let max_requests = config.max_requests.max(0) as usize;

        if count <= max_requests {
            return Ok(RateLimitDecision::allow());
        }

        // One violation (and at most one escalation) per exceeded window
        if count == max_requests + 1 {
            self.record_violation(ip, endpoint, &config, count, now).await?;
        }

        tracing::debug!(ip = %ip, endpoint = %endpoint, count = count, "Rate limit exceeded");
        Ok(RateLimitDecision::reject(config.retry_after_secs()))
    }

    async fn record_violation(
        &self,
        ip: &str,
        endpoint: &str,
        config: &RateLimitConfig,
        count: usize,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.store
            .insert_violation(&RateLimitViolation {
                ip: ip.to_string(),
                endpoint: endpoint.to_string(),
                request_count: i32::try_from(count).unwrap_or(i32::MAX),
                limit: config.max_requests,
                created_at: now,
            })
            .await?;

        metrics::counter!("trust_core_rate_limit_violations_total").increment(1);
        tracing::warn!(
            ip = %ip,
            endpoint = %endpoint,
            limit = config.max_requests,
            window_ms = config.window_ms,
            "Rate limit violation recorded"
        );

        let Some(minutes) = config.block_duration_minutes else {
            return Ok(());
        };

        // Violation row and block are two independent writes
        let reason = format!("rate limit exceeded on {}", endpoint);
        let expires_at = now + Duration::minutes(i64::from(minutes));
        if let Err(e) = self.blocks.block(ip, &reason, Some(expires_at), None).await {
            tracing::error!(
                ip = %ip,
                endpoint = %endpoint,
                error = %e,
                "Violation persisted but escalation to IP block failed"
            );
        }

        Ok(())
    }

    // ==================== Config admin ====================

    pub async fn upsert_config(&self, config: RateLimitConfig) -> Result<RateLimitConfig, AppError> {
        let saved = self.store.upsert_config(&config).await?;
        tracing::info!(
            endpoint = %saved.endpoint,
            window_ms = saved.window_ms,
            max_requests = saved.max_requests,
            enabled = saved.enabled,
            "Rate limit config saved"
        );
        Ok(saved)
    }

    pub async fn delete_config(&self, endpoint: &str) -> Result<(), AppError> {
        if !self.store.delete_config(endpoint).await? {
            return Err(AppError::NotFound(format!("Rate limit config {}", endpoint)));
        }
        tracing::info!(endpoint = %endpoint, "Rate limit config deleted");
        Ok(())
    }

    pub async fn list_configs(&self) -> Result<Vec<RateLimitConfig>, AppError> {
        self.store.list_configs().await
    }

    pub async fn list_violations(&self, limit: i64) -> Result<Vec<RateLimitViolation>, AppError> {
        self.store.list_violations(limit.clamp(1, 1000)).await
    }

    // ==================== Ledger ====================

    /// Drop ledger entries idle for longer than `idle`
    pub async fn collect_idle(&self, now: DateTime<Utc>, idle: Duration) -> Result<usize, AppError> {
        self.ledger.collect_idle(now, idle).await
    }

    pub async fn ledger_stats(&self) -> Result<LedgerStats, AppError> {
        self.ledger.stats().await
    }
}
