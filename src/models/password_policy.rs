//! Password policy domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// The single active password policy row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PasswordPolicyConfig {
    pub min_length: i32,
    pub require_upper: bool,
    pub require_lower: bool,
    pub require_digit: bool,
    pub require_special: bool,
    pub expiration_days: Option<i32>,
    pub prevent_reuse: i32,
    pub check_breached: bool,
    pub enabled: bool,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl Default for PasswordPolicyConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_upper: true,
            require_lower: true,
            require_digit: true,
            require_special: false,
            expiration_days: None,
            prevent_reuse: 5,
            check_breached: true,
            enabled: true,
            updated_by: None,
            updated_at: Utc::now(),
        }
    }
}

/// Policy replacement request (admin API)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdatePasswordPolicyRequest {
    #[validate(range(min = 1, max = 128))]
    pub min_length: i32,
    pub require_upper: bool,
    pub require_lower: bool,
    pub require_digit: bool,
    pub require_special: bool,
    #[validate(range(min = 1, max = 3650))]
    pub expiration_days: Option<i32>,
    #[validate(range(min = 0, max = 24))]
    pub prevent_reuse: i32,
    pub check_breached: bool,
    pub enabled: bool,
}

impl UpdatePasswordPolicyRequest {
    pub fn into_policy(self, updated_by: Option<Uuid>) -> PasswordPolicyConfig {
        PasswordPolicyConfig {
            min_length: self.min_length,
            require_upper: self.require_upper,
            require_lower: self.require_lower,
            require_digit: self.require_digit,
            require_special: self.require_special,
            expiration_days: self.expiration_days,
            prevent_reuse: self.prevent_reuse,
            check_breached: self.check_breached,
            enabled: self.enabled,
            updated_by,
            updated_at: Utc::now(),
        }
    }
}

/// Stored previous credential hash
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PasswordHistoryEntry {
    pub user_id: Uuid,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Every violated rule, not just the first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl PasswordValidation {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}
