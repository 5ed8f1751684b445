//! 两步验证服务
//!
//! TOTP (SHA1, 6 digits, 30 s step, ±2 steps skew) plus single-use recovery codes.

use crate::{
    auth::{
        password::{CredentialHash, PasswordHasher},
        recovery::{find_matching_hash, RecoveryCodeBatch},
    },
    error::AppError,
    models::{
        security_event::{NewSecurityEvent, SecurityEventType},
        two_factor::{TwoFactorSetup, TwoFactorStatus},
        user::UserSecurity,
    },
    repository::store::UserSecurityStore,
    services::event_service::EventLog,
};
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECS: u64 = 30;
/// Accepted steps either side of the current one
pub const TOTP_SKEW_STEPS: u8 = 2;

/// Build the TOTP for a base32 secret
pub fn build_totp(secret_base32: &str, issuer: &str, account: &str) -> Result<TOTP, AppError> {
    let secret_bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| AppError::Validation(format!("Invalid TOTP secret: {:?}", e)))?;

    // ':' is reserved in otpauth labels
    let account = account.replace(':', "_");

    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        TOTP_SKEW_STEPS,
        TOTP_STEP_SECS,
        secret_bytes,
        Some(issuer.to_string()),
        account,
    )
    .map_err(|e| AppError::Validation(format!("Invalid TOTP secret: {}", e)))
}

/// Check `token` at an explicit unix time
pub fn verify_totp_at(totp: &TOTP, token: &str, unix_time: u64) -> bool {
    let token = token.trim();
    token.len() == TOTP_DIGITS && totp.check(token, unix_time)
}

fn verify_totp_now(totp: &TOTP, token: &str) -> bool {
    let token = token.trim();
    token.len() == TOTP_DIGITS && totp.check_current(token).unwrap_or(false)
}

pub struct TwoFactorService {
    users: Arc<dyn UserSecurityStore>,
    events: Arc<EventLog>,
    hasher: Arc<PasswordHasher>,
    issuer: String,
}

impl TwoFactorService {
    pub fn new(
        users: Arc<dyn UserSecurityStore>,
        events: Arc<EventLog>,
        hasher: Arc<PasswordHasher>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            users,
            events,
            hasher,
            issuer: issuer.into(),
        }
    }

    async fn load_user(&self, user_id: Uuid) -> Result<UserSecurity, AppError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    /// 生成新密钥与二维码 (尚未启用)
    pub async fn generate_secret(&self, user_id: Uuid) -> Result<TwoFactorSetup, AppError> {
        let user = self.load_user(user_id).await?;

        let secret = Secret::generate_secret().to_encoded().to_string();
        let totp = build_totp(&secret, &self.issuer, &user.username)?;

        let qr = totp
            .get_qr_base64()
            .map_err(|e| AppError::Internal(format!("QR generation failed: {}", e)))?;

        Ok(TwoFactorSetup {
            otpauth_url: totp.get_url(),
            qr_code: format!("data:image/png;base64,{}", qr),
            secret,
        })
    }

    /// 启用 2FA, 返回一次性明文恢复码
    pub async fn enable(
        &self,
        user_id: Uuid,
        secret: &str,
        token: &str,
        ip: Option<&str>,
    ) -> Result<Vec<String>, AppError> {
        let user = self.load_user(user_id).await?;
        if user.two_factor_enabled {
            return Err(AppError::BadRequest(
                "Two-factor authentication is already enabled".to_string(),
            ));
        }

        let totp = build_totp(secret, &self.issuer, &user.username)?;
        if !verify_totp_now(&totp, token) {
            tracing::info!(user_id = %user_id, "2FA enable rejected: invalid token");
            return Err(AppError::Validation("Invalid verification code".to_string()));
        }

        let batch = self.generate_batch().await?;
        let hashes: Vec<String> = batch.hashes.into_iter().map(CredentialHash::into_inner).collect();

        if !self.users.enable_two_factor(user_id, secret, &hashes).await? {
            return Err(AppError::NotFound("User".to_string()));
        }

        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::TwoFaEnabled)
                    .user(Some(user_id))
                    .ip(ip),
            )
            .await?;

        tracing::info!(user_id = %user_id, "2FA enabled");
        Ok(batch.codes)
    }

    /// 关闭 2FA, 需要当前密码
    pub async fn disable(
        &self,
        user_id: Uuid,
        password: &str,
        ip: Option<&str>,
    ) -> Result<(), AppError> {
        let user = self.load_user(user_id).await?;

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let stored = CredentialHash::from_stored(user.password_hash.clone());
        let password_ok =
            tokio::task::spawn_blocking(move || hasher.matches(&password, &stored)).await?;

        if !password_ok {
            tracing::info!(user_id = %user_id, "2FA disable rejected: wrong password");
            return Err(AppError::Unauthorized);
        }

        self.users.disable_two_factor(user_id).await?;

        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::TwoFaDisabled)
                    .user(Some(user_id))
                    .ip(ip),
            )
            .await?;

        tracing::info!(user_id = %user_id, "2FA disabled");
        Ok(())
    }

    /// TOTP first, then single-use recovery codes
    pub async fn verify(&self, user_id: Uuid, token: &str) -> Result<bool, AppError> {
        let user = self.load_user(user_id).await?;
        let Some(secret) = user.two_factor_secret.as_deref().filter(|_| user.two_factor_enabled)
        else {
            return Ok(false);
        };

        let totp = build_totp(secret, &self.issuer, &user.username)?;
        if verify_totp_now(&totp, token) {
            return Ok(true);
        }

        if let Some(hash) = self.match_recovery_code(&user, token).await? {
            // Lost race against a concurrent use of the same code
            if self.users.consume_recovery_code(user_id, &hash).await? {
                self.events
                    .record(
                        NewSecurityEvent::new(SecurityEventType::RecoveryCodeUsed)
                            .user(Some(user_id))
                            .metadata(serde_json::json!({
                                "remaining": user.recovery_code_hashes.len().saturating_sub(1),
                            })),
                    )
                    .await?;
                tracing::info!(user_id = %user_id, "Recovery code consumed");
                return Ok(true);
            }
        }

        self.events
            .record(NewSecurityEvent::new(SecurityEventType::TwoFaFailed).user(Some(user_id)))
            .await?;
        Ok(false)
    }

    /// 重新生成恢复码, 旧的全部失效; 需要有效 TOTP
    pub async fn regenerate_recovery_codes(
        &self,
        user_id: Uuid,
        token: &str,
        ip: Option<&str>,
    ) -> Result<Vec<String>, AppError> {
        let user = self.load_user(user_id).await?;
        let Some(secret) = user.two_factor_secret.as_deref().filter(|_| user.two_factor_enabled)
        else {
            return Err(AppError::BadRequest(
                "Two-factor authentication is not enabled".to_string(),
            ));
        };

        let totp = build_totp(secret, &self.issuer, &user.username)?;
        if !verify_totp_now(&totp, token) {
            return Err(AppError::Unauthorized);
        }

        let batch = self.generate_batch().await?;
        let hashes: Vec<String> = batch.hashes.into_iter().map(CredentialHash::into_inner).collect();
        self.users.replace_recovery_codes(user_id, &hashes).await?;

        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::RecoveryCodesRegenerated)
                    .user(Some(user_id))
                    .ip(ip),
            )
            .await?;

        Ok(batch.codes)
    }

    pub async fn remaining_recovery_codes(&self, user_id: Uuid) -> Result<usize, AppError> {
        let user = self.load_user(user_id).await?;
        Ok(user.recovery_code_hashes.len())
    }

    pub async fn status(&self, user_id: Uuid) -> Result<TwoFactorStatus, AppError> {
        let user = self.load_user(user_id).await?;
        Ok(TwoFactorStatus {
            enabled: user.two_factor_enabled,
            remaining_recovery_codes: user.recovery_code_hashes.len(),
        })
    }

    async fn generate_batch(&self) -> Result<RecoveryCodeBatch, AppError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || RecoveryCodeBatch::generate(&hasher)).await?
    }

    async fn match_recovery_code(
        &self,
        user: &UserSecurity,
        input: &str,
    ) -> Result<Option<String>, AppError> {
        if user.recovery_code_hashes.is_empty() {
            return Ok(None);
        }

        let hasher = self.hasher.clone();
        let input = input.to_string();
        let hashes = user.recovery_code_hashes.clone();

        let matched = tokio::task::spawn_blocking(move || {
            find_matching_hash(&hasher, &input, &hashes).map(|idx| hashes[idx].clone())
        })
        .await?;

        Ok(matched)
    }
}
