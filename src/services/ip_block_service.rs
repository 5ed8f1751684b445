//! IP 封禁服务

use crate::{
    error::AppError,
    models::{
        ip_block::BlockedIp,
        security_event::{NewSecurityEvent, SecurityEventType},
    },
    repository::store::BlockedIpStore,
    services::event_service::EventLog,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct IpBlockRegistry {
    store: Arc<dyn BlockedIpStore>,
    events: Arc<EventLog>,
}

impl IpBlockRegistry {
    pub fn new(store: Arc<dyn BlockedIpStore>, events: Arc<EventLog>) -> Self {
        Self { store, events }
    }

    pub async fn is_blocked(&self, ip: &str) -> Result<bool, AppError> {
        self.is_blocked_at(ip, Utc::now()).await
    }

    /// 过期记录在读取时删除; 删除带过期条件, 并发的重新封禁不会被误删
    pub async fn is_blocked_at(&self, ip: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let Some(block) = self.store.find(ip).await? else {
            return Ok(false);
        };

        if block.is_active_at(now) {
            return Ok(true);
        }

        if self.store.delete_if_expired(ip, now).await? {
            tracing::info!(ip = %ip, expires_at = ?block.expires_at, "Expired IP block removed");
            return Ok(false);
        }

        // 行已被替换 (重新封禁) 或已被删除, 以当前状态为准
        Ok(self
            .store
            .find(ip)
            .await?
            .is_some_and(|current| current.is_active_at(now)))
    }

    /// Upsert by ip; an existing block gets the new reason and expiry
    pub async fn block(
        &self,
        ip: &str,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
        actor: Option<Uuid>,
    ) -> Result<BlockedIp, AppError> {
        let block = self
            .store
            .upsert(&BlockedIp {
                ip: ip.to_string(),
                reason: reason.to_string(),
                expires_at,
                created_at: Utc::now(),
            })
            .await?;

        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::IpBlocked)
                    .user(actor)
                    .ip(Some(ip))
                    .metadata(serde_json::json!({
                        "reason": reason,
                        "expires_at": expires_at,
                    })),
            )
            .await?;

        metrics::counter!("trust_core_ip_blocks_total").increment(1);
        tracing::warn!(ip = %ip, reason = %reason, expires_at = ?expires_at, "IP blocked");

        Ok(block)
    }

    /// Errors with `NotFound` when the ip was not blocked
    pub async fn unblock(&self, ip: &str, actor: Option<Uuid>) -> Result<(), AppError> {
        if !self.store.delete(ip).await? {
            return Err(AppError::NotFound(format!("Blocked IP {}", ip)));
        }

        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::IpUnblocked)
                    .user(actor)
                    .ip(Some(ip)),
            )
            .await?;

        tracing::info!(ip = %ip, actor = ?actor, "IP unblocked");
        Ok(())
    }

    pub async fn list_active(&self) -> Result<Vec<BlockedIp>, AppError> {
        self.list_active_at(Utc::now()).await
    }

    pub async fn list_active_at(&self, now: DateTime<Utc>) -> Result<Vec<BlockedIp>, AppError> {
        let blocks = self.store.list_active(now).await?;
        Ok(blocks.into_iter().filter(|b| b.is_active_at(now)).collect())
    }

    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        self.sweep_expired_at(Utc::now()).await
    }

    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let removed = self.store.delete_expired(now).await?;
        if removed > 0 {
            tracing::info!(removed = removed, "Expired IP blocks swept");
        }
        Ok(removed)
    }
}
