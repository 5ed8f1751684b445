//! In-process store backend
//!
//! Implements every store trait over `tokio::sync::RwLock`-guarded maps. Used by
//! the test suite and for single-process development without PostgreSQL.

use crate::{
    error::AppError,
    models::{
        integrity::IntegrityBaseline,
        ip_block::BlockedIp,
        password_policy::{PasswordHistoryEntry, PasswordPolicyConfig},
        rate_limit::{RateLimitConfig, RateLimitViolation},
        security_event::{SecurityEvent, SecurityEventFilters},
        session::{Session, SessionWithOwner},
        user::{AdminTwoFactorCoverage, UserSecurity, UserSummary},
    },
    repository::store::{
        BaselineStore, BlockedIpStore, PasswordPolicyStore, RateLimitStore, SecurityEventStore,
        SessionStore, UserSecurityStore,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    events: RwLock<Vec<SecurityEvent>>,
    blocked_ips: RwLock<HashMap<String, BlockedIp>>,
    rate_limit_configs: RwLock<HashMap<String, RateLimitConfig>>,
    violations: RwLock<Vec<RateLimitViolation>>,
    users: RwLock<HashMap<Uuid, UserSecurity>>,
    policy: RwLock<Option<PasswordPolicyConfig>>,
    password_history: RwLock<Vec<PasswordHistoryEntry>>,
    sessions: RwLock<HashMap<Uuid, Session>>,
    baseline: RwLock<Option<IntegrityBaseline>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account (the account system itself lives outside this crate)
    pub async fn insert_user(&self, user: UserSecurity) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl SecurityEventStore for MemoryStore {
    async fn insert(&self, event: &SecurityEvent) -> Result<(), AppError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn query(
        &self,
        filters: &SecurityEventFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SecurityEvent>, AppError> {
        let events = self.events.read().await;
        let mut matching: Vec<SecurityEvent> = events
            .iter()
            .filter(|event| filters.matches(event))
            .cloned()
            .collect();
        // stable sort keeps insertion order for equal timestamps; reverse for newest first
        matching.sort_by_key(|event| event.created_at);
        matching.reverse();

        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(&self, filters: &SecurityEventFilters) -> Result<i64, AppError> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|event| filters.matches(event)).count() as i64)
    }
}

#[async_trait]
impl BlockedIpStore for MemoryStore {
    async fn find(&self, ip: &str) -> Result<Option<BlockedIp>, AppError> {
        Ok(self.blocked_ips.read().await.get(ip).cloned())
    }

    async fn upsert(&self, block: &BlockedIp) -> Result<BlockedIp, AppError> {
        let mut blocked = self.blocked_ips.write().await;
        let stored = blocked
            .entry(block.ip.clone())
            .and_modify(|existing| {
                existing.reason = block.reason.clone();
                existing.expires_at = block.expires_at;
            })
            .or_insert_with(|| block.clone());
        Ok(stored.clone())
    }

    async fn delete(&self, ip: &str) -> Result<bool, AppError> {
        Ok(self.blocked_ips.write().await.remove(ip).is_some())
    }

    async fn delete_if_expired(&self, ip: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut blocked = self.blocked_ips.write().await;
        match blocked.get(ip) {
            Some(block) if !block.is_active_at(now) => Ok(blocked.remove(ip).is_some()),
            _ => Ok(false),
        }
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<BlockedIp>, AppError> {
        let blocked = self.blocked_ips.read().await;
        let mut active: Vec<BlockedIp> = blocked
            .values()
            .filter(|block| block.is_active_at(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut blocked = self.blocked_ips.write().await;
        let before = blocked.len();
        blocked.retain(|_, block| block.expires_at.map_or(true, |expires_at| expires_at > now));
        Ok((before - blocked.len()) as u64)
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn find_config(&self, endpoint: &str) -> Result<Option<RateLimitConfig>, AppError> {
        Ok(self.rate_limit_configs.read().await.get(endpoint).cloned())
    }

    async fn upsert_config(&self, config: &RateLimitConfig) -> Result<RateLimitConfig, AppError> {
        self.rate_limit_configs
            .write()
            .await
            .insert(config.endpoint.clone(), config.clone());
        Ok(config.clone())
    }

    async fn delete_config(&self, endpoint: &str) -> Result<bool, AppError> {
        Ok(self.rate_limit_configs.write().await.remove(endpoint).is_some())
    }

    async fn list_configs(&self) -> Result<Vec<RateLimitConfig>, AppError> {
        let mut configs: Vec<RateLimitConfig> =
            self.rate_limit_configs.read().await.values().cloned().collect();
        configs.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        Ok(configs)
    }

    async fn insert_violation(&self, violation: &RateLimitViolation) -> Result<(), AppError> {
        self.violations.write().await.push(violation.clone());
        Ok(())
    }

    async fn list_violations(&self, limit: i64) -> Result<Vec<RateLimitViolation>, AppError> {
        let violations = self.violations.read().await;
        Ok(violations
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserSecurityStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserSecurity>, AppError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserSecurity>, AppError> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.username == username).cloned())
    }

    async fn enable_two_factor(
        &self,
        id: Uuid,
        secret: &str,
        recovery_code_hashes: &[String],
    ) -> Result<bool, AppError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        user.two_factor_enabled = true;
        user.two_factor_secret = Some(secret.to_string());
        user.recovery_code_hashes = recovery_code_hashes.to_vec();
        Ok(true)
    }

    async fn disable_two_factor(&self, id: Uuid) -> Result<bool, AppError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        user.two_factor_enabled = false;
        user.two_factor_secret = None;
        user.recovery_code_hashes.clear();
        Ok(true)
    }

    async fn replace_recovery_codes(
        &self,
        id: Uuid,
        recovery_code_hashes: &[String],
    ) -> Result<bool, AppError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        user.recovery_code_hashes = recovery_code_hashes.to_vec();
        Ok(true)
    }

    async fn consume_recovery_code(&self, id: Uuid, code_hash: &str) -> Result<bool, AppError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        match user.recovery_code_hashes.iter().position(|h| h == code_hash) {
            Some(idx) => {
                user.recovery_code_hashes.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lock_account(&self, id: Uuid, until: DateTime<Utc>) -> Result<bool, AppError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        user.locked_until = Some(until);
        Ok(true)
    }

    async fn unlock_account(&self, id: Uuid) -> Result<bool, AppError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        user.locked_until = None;
        Ok(true)
    }

    async fn count_locked(&self, now: DateTime<Utc>) -> Result<i64, AppError> {
        let users = self.users.read().await;
        Ok(users.values().filter(|user| user.is_locked_at(now)).count() as i64)
    }

    async fn admin_two_factor_coverage(&self) -> Result<AdminTwoFactorCoverage, AppError> {
        let users = self.users.read().await;
        let admins = users.values().filter(|user| user.is_admin());
        let (total_admins, admins_with_two_factor) =
            admins.fold((0, 0), |(total, with_2fa), user| {
                (total + 1, with_2fa + i64::from(user.two_factor_enabled))
            });
        Ok(AdminTwoFactorCoverage {
            total_admins,
            admins_with_two_factor,
        })
    }
}

#[async_trait]
impl PasswordPolicyStore for MemoryStore {
    async fn active_policy(&self) -> Result<Option<PasswordPolicyConfig>, AppError> {
        Ok(self.policy.read().await.clone())
    }

    async fn replace_policy(&self, policy: &PasswordPolicyConfig) -> Result<(), AppError> {
        *self.policy.write().await = Some(policy.clone());
        Ok(())
    }

    async fn insert_history(&self, entry: &PasswordHistoryEntry) -> Result<(), AppError> {
        self.password_history.write().await.push(entry.clone());
        Ok(())
    }

    async fn trim_history(&self, user_id: Uuid, keep: i64) -> Result<u64, AppError> {
        let mut history = self.password_history.write().await;
        let total = history.iter().filter(|e| e.user_id == user_id).count();
        let mut excess = total.saturating_sub(keep.max(0) as usize);
        let removed = excess as u64;

        // Entries are appended in order, so the oldest come first
        history.retain(|entry| {
            if entry.user_id == user_id && excess > 0 {
                excess -= 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn recent_history(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PasswordHistoryEntry>, AppError> {
        let history = self.password_history.read().await;
        Ok(history
            .iter()
            .rev()
            .filter(|entry| entry.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, session: &Session) -> Result<(), AppError> {
        self.sessions.write().await.insert(session.id, session.clone());
        Ok(())
    }

    async fn list_live(
        &self,
        user_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionWithOwner>, AppError> {
        let sessions = self.sessions.read().await;
        let users = self.users.read().await;

        let mut live: Vec<SessionWithOwner> = sessions
            .values()
            .filter(|session| session.is_live_at(now))
            .filter(|session| user_id.map_or(true, |uid| session.user_id == uid))
            .filter_map(|session| {
                let owner = users.get(&session.user_id)?;
                Some(SessionWithOwner {
                    session: session.clone(),
                    owner: UserSummary {
                        id: owner.id,
                        username: owner.username.clone(),
                        email: owner.email.clone(),
                    },
                })
            })
            .collect();
        live.sort_by(|a, b| b.session.last_activity.cmp(&a.session.last_activity));
        Ok(live)
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Session>, AppError> {
        Ok(self.sessions.write().await.remove(&id))
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn touch(
        &self,
        id: Uuid,
        ip: Option<&str>,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(&id).filter(|s| s.is_live_at(now)) else {
            return Ok(false);
        };
        session.last_activity = now;
        if let Some(ip) = ip {
            session.ip = Some(ip.to_string());
        }
        if let Some(user_agent) = user_agent {
            session.user_agent = Some(user_agent.to_string());
        }
        Ok(true)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.is_live_at(now));
        Ok((before - sessions.len()) as u64)
    }
}

#[async_trait]
impl BaselineStore for MemoryStore {
    async fn load(&self) -> Result<Option<IntegrityBaseline>, AppError> {
        Ok(self.baseline.read().await.clone())
    }

    async fn replace(&self, baseline: &IntegrityBaseline) -> Result<(), AppError> {
        *self.baseline.write().await = Some(baseline.clone());
        Ok(())
    }
}
