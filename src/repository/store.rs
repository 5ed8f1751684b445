//! Storage traits
//!
//! Services depend on these traits only. `Pg*Repository` types implement them
//! against PostgreSQL and `memory::MemoryStore` implements all of them in process.

use crate::{
    error::AppError,
    models::{
        integrity::IntegrityBaseline,
        ip_block::BlockedIp,
        password_policy::{PasswordHistoryEntry, PasswordPolicyConfig},
        rate_limit::{RateLimitConfig, RateLimitViolation},
        security_event::{SecurityEvent, SecurityEventFilters},
        session::{Session, SessionWithOwner},
        user::{AdminTwoFactorCoverage, UserSecurity},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Append-only security audit trail
#[async_trait]
pub trait SecurityEventStore: Send + Sync + 'static {
    async fn insert(&self, event: &SecurityEvent) -> Result<(), AppError>;

    /// Matching events, newest first
    async fn query(
        &self,
        filters: &SecurityEventFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SecurityEvent>, AppError>;

    async fn count(&self, filters: &SecurityEventFilters) -> Result<i64, AppError>;
}

#[async_trait]
pub trait BlockedIpStore: Send + Sync + 'static {
    async fn find(&self, ip: &str) -> Result<Option<BlockedIp>, AppError>;

    /// Insert or overwrite reason/expiry for an existing ip
    async fn upsert(&self, block: &BlockedIp) -> Result<BlockedIp, AppError>;

    /// Returns false when the ip was not blocked
    async fn delete(&self, ip: &str) -> Result<bool, AppError>;

    /// Delete the row only if it is still expired at `now`; a concurrent re-block survives
    async fn delete_if_expired(&self, ip: &str, now: DateTime<Utc>) -> Result<bool, AppError>;

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<BlockedIp>, AppError>;

    /// Delete every row with `expires_at <= now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync + 'static {
    async fn find_config(&self, endpoint: &str) -> Result<Option<RateLimitConfig>, AppError>;

    async fn upsert_config(&self, config: &RateLimitConfig) -> Result<RateLimitConfig, AppError>;

    async fn delete_config(&self, endpoint: &str) -> Result<bool, AppError>;

    async fn list_configs(&self) -> Result<Vec<RateLimitConfig>, AppError>;

    async fn insert_violation(&self, violation: &RateLimitViolation) -> Result<(), AppError>;

    /// Newest first
    async fn list_violations(&self, limit: i64) -> Result<Vec<RateLimitViolation>, AppError>;
}

/// Security columns of host-owned user accounts
#[async_trait]
pub trait UserSecurityStore: Send + Sync + 'static {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserSecurity>, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserSecurity>, AppError>;

    /// Sets flag, secret and codes together
    async fn enable_two_factor(
        &self,
        id: Uuid,
        secret: &str,
        recovery_code_hashes: &[String],
    ) -> Result<bool, AppError>;

    /// Clears flag, secret and codes together
    async fn disable_two_factor(&self, id: Uuid) -> Result<bool, AppError>;

    async fn replace_recovery_codes(
        &self,
        id: Uuid,
        recovery_code_hashes: &[String],
    ) -> Result<bool, AppError>;

    /// Removes exactly this hash; false if it was already gone
    async fn consume_recovery_code(&self, id: Uuid, code_hash: &str) -> Result<bool, AppError>;

    async fn lock_account(&self, id: Uuid, until: DateTime<Utc>) -> Result<bool, AppError>;

    async fn unlock_account(&self, id: Uuid) -> Result<bool, AppError>;

    async fn count_locked(&self, now: DateTime<Utc>) -> Result<i64, AppError>;

    async fn admin_two_factor_coverage(&self) -> Result<AdminTwoFactorCoverage, AppError>;
}

#[async_trait]
pub trait PasswordPolicyStore: Send + Sync + 'static {
    async fn active_policy(&self) -> Result<Option<PasswordPolicyConfig>, AppError>;

    /// Replaces the single active row wholesale
    async fn replace_policy(&self, policy: &PasswordPolicyConfig) -> Result<(), AppError>;

    async fn insert_history(&self, entry: &PasswordHistoryEntry) -> Result<(), AppError>;

    /// Keep only the newest `keep` rows for the user
    async fn trim_history(&self, user_id: Uuid, keep: i64) -> Result<u64, AppError>;

    /// Newest first
    async fn recent_history(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PasswordHistoryEntry>, AppError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn create(&self, session: &Session) -> Result<(), AppError>;

    /// Live sessions (`expires_at > now`), most recent activity first
    async fn list_live(
        &self,
        user_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionWithOwner>, AppError>;

    /// Returns the deleted row, if any
    async fn delete(&self, id: Uuid) -> Result<Option<Session>, AppError>;

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, AppError>;

    async fn touch(
        &self,
        id: Uuid,
        ip: Option<&str>,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait BaselineStore: Send + Sync + 'static {
    async fn load(&self) -> Result<Option<IntegrityBaseline>, AppError>;

    /// Full replace
    async fn replace(&self, baseline: &IntegrityBaseline) -> Result<(), AppError>;
}
