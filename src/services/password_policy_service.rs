//! 密码策略服务

use crate::{
    auth::password::{CredentialHash, PasswordHasher},
    error::AppError,
    models::{
        password_policy::{PasswordHistoryEntry, PasswordPolicyConfig, PasswordValidation},
        security_event::{NewSecurityEvent, SecurityEventType},
    },
    repository::store::PasswordPolicyStore,
    services::{breach::BreachChecker, event_service::EventLog},
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct PasswordPolicyService {
    store: Arc<dyn PasswordPolicyStore>,
    events: Arc<EventLog>,
    hasher: Arc<PasswordHasher>,
    breach: Arc<BreachChecker>,
}

impl PasswordPolicyService {
    pub fn new(
        store: Arc<dyn PasswordPolicyStore>,
        events: Arc<EventLog>,
        hasher: Arc<PasswordHasher>,
        breach: Arc<BreachChecker>,
    ) -> Self {
        Self {
            store,
            events,
            hasher,
            breach,
        }
    }

    /// Stored policy; `NotFound` when none has been configured
    pub async fn get_policy(&self) -> Result<PasswordPolicyConfig, AppError> {
        self.store
            .active_policy()
            .await?
            .ok_or_else(|| AppError::NotFound("Password policy".to_string()))
    }

    /// Stored policy, else the built-in default
    pub async fn effective_policy(&self) -> Result<PasswordPolicyConfig, AppError> {
        Ok(self.store.active_policy().await?.unwrap_or_default())
    }

    /// 整体替换当前策略
    pub async fn update_policy(
        &self,
        policy: PasswordPolicyConfig,
        actor: Option<Uuid>,
    ) -> Result<PasswordPolicyConfig, AppError> {
        self.store.replace_policy(&policy).await?;

        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::PolicyUpdated)
                    .user(actor)
                    .metadata(serde_json::to_value(&policy).unwrap_or_default()),
            )
            .await?;

        tracing::info!(
            min_length = policy.min_length,
            prevent_reuse = policy.prevent_reuse,
            check_breached = policy.check_breached,
            enabled = policy.enabled,
            "Password policy updated"
        );
        Ok(policy)
    }

    /// 校验密码, 汇总所有不满足的规则
    pub async fn validate(
        &self,
        password: &str,
        user_id: Option<Uuid>,
    ) -> Result<PasswordValidation, AppError> {
        let policy = self.effective_policy().await?;
        if !policy.enabled {
            return Ok(PasswordValidation::from_errors(Vec::new()));
        }

        let mut errors = composition_errors(&policy, password);

        if let Some(user_id) = user_id {
            if policy.prevent_reuse > 0 && self.was_used_recently(user_id, password, &policy).await? {
                errors.push(format!(
                    "Password must not match any of your last {} passwords",
                    policy.prevent_reuse
                ));
            }
        }

        if policy.check_breached && self.breach.is_breached(password).await {
            errors.push(
                "Password has appeared in a known data breach; choose a different one".to_string(),
            );
        }

        Ok(PasswordValidation::from_errors(errors))
    }

    /// 追加历史并裁剪到最近 `prevent_reuse` 条
    pub async fn add_to_history(
        &self,
        user_id: Uuid,
        password_hash: &CredentialHash,
    ) -> Result<(), AppError> {
        self.add_to_history_at(user_id, password_hash, Utc::now()).await
    }

    pub async fn add_to_history_at(
        &self,
        user_id: Uuid,
        password_hash: &CredentialHash,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let policy = self.effective_policy().await?;

        self.store
            .insert_history(&PasswordHistoryEntry {
                user_id,
                password_hash: password_hash.as_str().to_string(),
                created_at: now,
            })
            .await?;

        // The newest entry is kept even with reuse prevention off; expiry reads it
        let keep = i64::from(policy.prevent_reuse.max(1));
        let trimmed = self.store.trim_history(user_id, keep).await?;
        tracing::debug!(user_id = %user_id, trimmed = trimmed, "Password history updated");

        Ok(())
    }

    pub async fn is_expired(&self, user_id: Uuid) -> Result<bool, AppError> {
        self.is_expired_at(user_id, Utc::now()).await
    }

    pub async fn is_expired_at(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let policy = self.effective_policy().await?;
        let Some(days) = policy.expiration_days.filter(|_| policy.enabled) else {
            return Ok(false);
        };

        let latest = self.store.recent_history(user_id, 1).await?;
        let Some(latest) = latest.first() else {
            return Ok(false);
        };

        Ok(now > latest.created_at + Duration::days(i64::from(days)))
    }

    async fn was_used_recently(
        &self,
        user_id: Uuid,
        password: &str,
        policy: &PasswordPolicyConfig,
    ) -> Result<bool, AppError> {
        let history = self
            .store
            .recent_history(user_id, i64::from(policy.prevent_reuse))
            .await?;
        if history.is_empty() {
            return Ok(false);
        }

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let reused = tokio::task::spawn_blocking(move || {
            history.iter().any(|entry| {
                hasher.matches(&password, &CredentialHash::from_stored(entry.password_hash.as_str()))
            })
        })
        .await?;

        Ok(reused)
    }
}

/// Length and character-class rules
pub fn composition_errors(policy: &PasswordPolicyConfig, password: &str) -> Vec<String> {
    let mut errors = Vec::new();

    let length = password.chars().count();
    if length < policy.min_length.max(0) as usize {
        errors.push(format!(
            "Password must be at least {} characters long",
            policy.min_length
        ));
    }
    if policy.require_upper && !password.chars().any(char::is_uppercase) {
        errors.push("Password must contain an uppercase letter".to_string());
    }
    if policy.require_lower && !password.chars().any(char::is_lowercase) {
        errors.push("Password must contain a lowercase letter".to_string());
    }
    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain a digit".to_string());
    }
    if policy.require_special && !password.chars().any(is_special) {
        errors.push("Password must contain a special character".to_string());
    }

    errors
}

fn is_special(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace()
}
