//! 会话管理服务

use crate::{
    error::AppError,
    models::{
        security_event::{NewSecurityEvent, SecurityEventType},
        session::{LogoutInitiator, Session, SessionWithOwner},
    },
    repository::store::SessionStore,
    services::event_service::EventLog,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    events: Arc<EventLog>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn SessionStore>, events: Arc<EventLog>) -> Self {
        Self { store, events }
    }

    /// 登录成功后由认证流程调用
    pub async fn create(
        &self,
        user_id: Uuid,
        ip: Option<&str>,
        user_agent: Option<&str>,
        ttl: Duration,
    ) -> Result<Session, AppError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            ip: ip.map(str::to_string),
            user_agent: user_agent.map(str::to_string),
            last_activity: now,
            created_at: now,
            expires_at: now + ttl,
        };

        self.store.create(&session).await?;
        tracing::debug!(session_id = %session.id, user_id = %user_id, "Session created");
        Ok(session)
    }

    pub async fn list_all(&self, user_id: Option<Uuid>) -> Result<Vec<SessionWithOwner>, AppError> {
        self.list_all_at(user_id, Utc::now()).await
    }

    /// Live sessions, newest activity first
    pub async fn list_all_at(
        &self,
        user_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionWithOwner>, AppError> {
        self.store.list_live(user_id, now).await
    }

    /// 强制下线单个会话
    pub async fn force_logout(
        &self,
        session_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<Session, AppError> {
        let session = self
            .store
            .delete(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Session".to_string()))?;

        let initiator = LogoutInitiator::resolve(session.user_id, actor);
        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::Logout)
                    .user(Some(session.user_id))
                    .ip(session.ip.as_deref())
                    .metadata(serde_json::json!({
                        "session_id": session.id,
                        "initiated_by": initiator.as_str(),
                        "actor_id": actor,
                    })),
            )
            .await?;

        tracing::info!(
            session_id = %session.id,
            user_id = %session.user_id,
            initiated_by = initiator.as_str(),
            "Session revoked"
        );
        Ok(session)
    }

    /// 强制下线用户的所有会话, 记录一条汇总事件
    pub async fn force_logout_all(&self, user_id: Uuid, actor: Option<Uuid>) -> Result<u64, AppError> {
        let deleted = self.store.delete_for_user(user_id).await?;

        let initiator = LogoutInitiator::resolve(user_id, actor);
        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::Logout)
                    .user(Some(user_id))
                    .metadata(serde_json::json!({
                        "all_sessions": true,
                        "count": deleted,
                        "initiated_by": initiator.as_str(),
                        "actor_id": actor,
                    })),
            )
            .await?;

        tracing::info!(
            user_id = %user_id,
            count = deleted,
            initiated_by = initiator.as_str(),
            "All sessions revoked"
        );
        Ok(deleted)
    }

    /// Refresh last activity; false when the session is gone or expired
    pub async fn touch(
        &self,
        session_id: Uuid,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<bool, AppError> {
        self.store.touch(session_id, ip, user_agent, Utc::now()).await
    }

    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        self.sweep_expired_at(Utc::now()).await
    }

    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let removed = self.store.delete_expired(now).await?;
        if removed > 0 {
            tracing::info!(removed = removed, "Expired sessions swept");
        }
        Ok(removed)
    }
}
