//! 风险评估
//! Fixed battery of checks reduced to a coarse risk level

use crate::{
    auth::password::{CredentialHash, PasswordHasher},
    config::{default_security_headers, AppConfig},
    error::AppError,
    models::{
        risk::{CheckStatus, DashboardOverview, LastLogin, RiskAssessment, RiskLevel, SecurityCheck},
        user::UserSecurity,
    },
    repository::store::UserSecurityStore,
    services::{event_service::EventLog, ip_block_service::IpBlockRegistry},
};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use uuid::Uuid;

/// Inputs taken from configuration
#[derive(Debug, Clone)]
pub struct RiskSettings {
    /// Public URL uses https
    pub https: bool,
    pub failed_login_threshold: i64,
    pub default_admin_username: String,
    pub default_admin_password: Secret<String>,
    pub security_headers: Vec<String>,
}

impl RiskSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            https: config.is_https(),
            failed_login_threshold: config.security.failed_login_threshold,
            default_admin_username: config.security.default_admin_username.clone(),
            default_admin_password: config.security.default_admin_password.clone(),
            security_headers: config.security.security_headers.clone(),
        }
    }
}

pub struct RiskAssessor {
    users: Arc<dyn UserSecurityStore>,
    events: Arc<EventLog>,
    blocks: Arc<IpBlockRegistry>,
    hasher: Arc<PasswordHasher>,
    settings: RiskSettings,
}

impl RiskAssessor {
    pub fn new(
        users: Arc<dyn UserSecurityStore>,
        events: Arc<EventLog>,
        blocks: Arc<IpBlockRegistry>,
        hasher: Arc<PasswordHasher>,
        settings: RiskSettings,
    ) -> Self {
        Self {
            users,
            events,
            blocks,
            hasher,
            settings,
        }
    }

    pub async fn assess(&self) -> Result<RiskAssessment, AppError> {
        let now = Utc::now();

        let checks = vec![
            https_check(self.settings.https),
            self.admin_two_factor_check().await?,
            self.default_admin_check().await?,
            self.failed_login_check().await?,
            self.locked_accounts_check(now).await?,
            security_headers_check(&self.settings.security_headers),
        ];

        let risk_level = RiskLevel::from_checks(&checks);
        tracing::debug!(risk_level = ?risk_level, "Risk assessment completed");

        Ok(RiskAssessment {
            risk_level,
            checks,
            assessed_at: now,
        })
    }

    /// 管理面板概览
    pub async fn dashboard_overview(&self, admin_id: Uuid) -> Result<DashboardOverview, AppError> {
        let assessment = self.assess().await?;
        let stats_24h = self.events.statistics(24).await?;
        let stats_7d = self.events.statistics(24 * 7).await?;
        let active_blocked_ips = self.blocks.list_active().await?.len();

        let last_login = self.events.last_login(admin_id).await?.map(|event| LastLogin {
            at: event.created_at,
            ip: event.ip,
        });

        Ok(DashboardOverview {
            assessment,
            failed_logins_24h: stats_24h.failed_logins,
            failed_logins_7d: stats_7d.failed_logins,
            active_blocked_ips,
            last_login,
        })
    }

    async fn admin_two_factor_check(&self) -> Result<SecurityCheck, AppError> {
        let coverage = self.users.admin_two_factor_coverage().await?;
        let missing = coverage.admins_without_two_factor();

        let check = if coverage.total_admins == 0 {
            SecurityCheck::new(
                "admin_two_factor",
                CheckStatus::Warn,
                "No administrator accounts found",
            )
        } else if missing == 0 {
            SecurityCheck::new(
                "admin_two_factor",
                CheckStatus::Pass,
                "All administrators have two-factor authentication enabled",
            )
        } else if missing < coverage.total_admins {
            SecurityCheck::new(
                "admin_two_factor",
                CheckStatus::Warn,
                format!(
                    "{} of {} administrators lack two-factor authentication",
                    missing, coverage.total_admins
                ),
            )
        } else {
            SecurityCheck::new(
                "admin_two_factor",
                CheckStatus::Fail,
                "No administrator has two-factor authentication enabled",
            )
        };
        Ok(check)
    }

    async fn default_admin_check(&self) -> Result<SecurityCheck, AppError> {
        let username = &self.settings.default_admin_username;
        let Some(user) = self.users.find_by_username(username).await? else {
            return Ok(SecurityCheck::new(
                "default_admin",
                CheckStatus::Pass,
                "Default administrator account not present",
            ));
        };

        if self.still_uses_default_password(&user).await? {
            Ok(SecurityCheck::new(
                "default_admin",
                CheckStatus::Fail,
                format!("Account '{}' still uses the default password", username),
            ))
        } else {
            Ok(SecurityCheck::new(
                "default_admin",
                CheckStatus::Warn,
                format!("Well-known account '{}' exists", username),
            ))
        }
    }

    async fn still_uses_default_password(&self, user: &UserSecurity) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        let password = self.settings.default_admin_password.expose_secret().clone();
        let stored = CredentialHash::from_stored(user.password_hash.clone());

        let matches = tokio::task::spawn_blocking(move || hasher.matches(&password, &stored)).await?;
        Ok(matches)
    }

    async fn failed_login_check(&self) -> Result<SecurityCheck, AppError> {
        let failed = self.events.statistics(24).await?.failed_logins;
        let threshold = self.settings.failed_login_threshold;

        let check = if failed > threshold {
            SecurityCheck::new(
                "failed_logins",
                CheckStatus::Warn,
                format!("{} failed logins in the last 24h (threshold {})", failed, threshold),
            )
        } else {
            SecurityCheck::new(
                "failed_logins",
                CheckStatus::Pass,
                format!("{} failed logins in the last 24h", failed),
            )
        };
        Ok(check)
    }

    async fn locked_accounts_check(&self, now: DateTime<Utc>) -> Result<SecurityCheck, AppError> {
        let locked = self.users.count_locked(now).await?;

        let check = if locked > 0 {
            SecurityCheck::new(
                "locked_accounts",
                CheckStatus::Warn,
                format!("{} accounts currently locked", locked),
            )
        } else {
            SecurityCheck::new("locked_accounts", CheckStatus::Pass, "No locked accounts")
        };
        Ok(check)
    }
}

fn https_check(https: bool) -> SecurityCheck {
    if https {
        SecurityCheck::new("https", CheckStatus::Pass, "Served over HTTPS")
    } else {
        SecurityCheck::new("https", CheckStatus::Fail, "Not served over HTTPS")
    }
}

/// Compares configured header names against the baseline set
fn security_headers_check(configured: &[String]) -> SecurityCheck {
    let configured: Vec<String> = configured.iter().map(|h| header_name(h)).collect();
    let baseline = default_security_headers();
    let missing: Vec<String> = baseline
        .iter()
        .map(|h| header_name(h))
        .filter(|name| !configured.contains(name))
        .collect();

    if missing.is_empty() {
        SecurityCheck::new("security_headers", CheckStatus::Pass, "All baseline security headers set")
    } else if missing.len() < baseline.len() {
        SecurityCheck::new(
            "security_headers",
            CheckStatus::Warn,
            format!("Missing security headers: {}", missing.join(", ")),
        )
    } else {
        SecurityCheck::new("security_headers", CheckStatus::Fail, "No baseline security headers set")
    }
}

fn header_name(line: &str) -> String {
    line.split(':').next().unwrap_or_default().trim().to_ascii_lowercase()
}
