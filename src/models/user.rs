//! Security view of user accounts
//!
//! Accounts are owned by the host application. This core reads the credential
//! hash and role, and owns the 2FA and lockout columns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Role name treated as administrator
pub const ADMIN_ROLE: &str = "admin";

/// Account columns relevant to security decisions
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserSecurity {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub password_hash: String,
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub recovery_code_hashes: Vec<String>,
    pub locked_until: Option<DateTime<Utc>>,
}

impl UserSecurity {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Minimal owner identity shown next to sessions
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

/// Administrator 2FA coverage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdminTwoFactorCoverage {
    pub total_admins: i64,
    pub admins_with_two_factor: i64,
}

impl AdminTwoFactorCoverage {
    pub fn admins_without_two_factor(&self) -> i64 {
        self.total_admins - self.admins_with_two_factor
    }
}
