//! 账号锁定
//! Used by the external auth flow after repeated failures, and by admins to unlock

use crate::{
    error::AppError,
    models::security_event::{LoginSubject, NewSecurityEvent, SecurityEventType},
    repository::store::UserSecurityStore,
    services::event_service::EventLog,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct AccountLockout {
    users: Arc<dyn UserSecurityStore>,
    events: Arc<EventLog>,
}

impl AccountLockout {
    pub fn new(users: Arc<dyn UserSecurityStore>, events: Arc<EventLog>) -> Self {
        Self { users, events }
    }

    pub async fn lock(
        &self,
        user_id: Uuid,
        until: DateTime<Utc>,
        reason: &str,
        actor: Option<Uuid>,
    ) -> Result<(), AppError> {
        if !self.users.lock_account(user_id, until).await? {
            return Err(AppError::NotFound("User".to_string()));
        }

        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::AccountLocked)
                    .user(Some(user_id))
                    .metadata(serde_json::json!({
                        "until": until,
                        "reason": reason,
                        "actor_id": actor,
                    })),
            )
            .await?;

        tracing::warn!(user_id = %user_id, until = %until, reason = %reason, "Account locked");
        Ok(())
    }

    pub async fn unlock(&self, user_id: Uuid, actor: Option<Uuid>) -> Result<(), AppError> {
        if !self.users.unlock_account(user_id).await? {
            return Err(AppError::NotFound("User".to_string()));
        }

        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::AccountUnlocked)
                    .user(Some(user_id))
                    .metadata(serde_json::json!({ "actor_id": actor })),
            )
            .await?;

        tracing::info!(user_id = %user_id, actor = ?actor, "Account unlocked");
        Ok(())
    }

    /// Lock when failures in the window reach `max_failures`; returns whether it locked.
    /// An account that is already locked is left as is.
    pub async fn lock_if_exceeded(
        &self,
        user_id: Uuid,
        window_minutes: i64,
        max_failures: i64,
        lock_for: Duration,
    ) -> Result<bool, AppError> {
        let now = Utc::now();
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;
        if user.is_locked_at(now) {
            return Ok(false);
        }

        let failures = self
            .events
            .recent_failed_logins(&LoginSubject::User(user_id), window_minutes)
            .await?;
        if failures < max_failures {
            return Ok(false);
        }

        let reason = format!("{} failed logins in {} minutes", failures, window_minutes);
        self.lock(user_id, now + lock_for, &reason, None).await?;
        Ok(true)
    }
}
