//! Security event domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Kind of security event recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventType {
    LoginSuccess,
    LoginFailed,
    Logout,
    AccountLocked,
    AccountUnlocked,
    PasswordChanged,
    PolicyUpdated,
    TwoFaEnabled,
    TwoFaDisabled,
    TwoFaFailed,
    RecoveryCodeUsed,
    RecoveryCodesRegenerated,
    IpBlocked,
    IpUnblocked,
    RequestBlocked,
    RateLimited,
    IntegrityScan,
}

impl SecurityEventType {
    pub const ALL: [SecurityEventType; 17] = [
        SecurityEventType::LoginSuccess,
        SecurityEventType::LoginFailed,
        SecurityEventType::Logout,
        SecurityEventType::AccountLocked,
        SecurityEventType::AccountUnlocked,
        SecurityEventType::PasswordChanged,
        SecurityEventType::PolicyUpdated,
        SecurityEventType::TwoFaEnabled,
        SecurityEventType::TwoFaDisabled,
        SecurityEventType::TwoFaFailed,
        SecurityEventType::RecoveryCodeUsed,
        SecurityEventType::RecoveryCodesRegenerated,
        SecurityEventType::IpBlocked,
        SecurityEventType::IpUnblocked,
        SecurityEventType::RequestBlocked,
        SecurityEventType::RateLimited,
        SecurityEventType::IntegrityScan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::LoginSuccess => "LOGIN_SUCCESS",
            SecurityEventType::LoginFailed => "LOGIN_FAILED",
            SecurityEventType::Logout => "LOGOUT",
            SecurityEventType::AccountLocked => "ACCOUNT_LOCKED",
            SecurityEventType::AccountUnlocked => "ACCOUNT_UNLOCKED",
            SecurityEventType::PasswordChanged => "PASSWORD_CHANGED",
            SecurityEventType::PolicyUpdated => "POLICY_UPDATED",
            SecurityEventType::TwoFaEnabled => "TWO_FA_ENABLED",
            SecurityEventType::TwoFaDisabled => "TWO_FA_DISABLED",
            SecurityEventType::TwoFaFailed => "TWO_FA_FAILED",
            SecurityEventType::RecoveryCodeUsed => "RECOVERY_CODE_USED",
            SecurityEventType::RecoveryCodesRegenerated => "RECOVERY_CODES_REGENERATED",
            SecurityEventType::IpBlocked => "IP_BLOCKED",
            SecurityEventType::IpUnblocked => "IP_UNBLOCKED",
            SecurityEventType::RequestBlocked => "REQUEST_BLOCKED",
            SecurityEventType::RateLimited => "RATE_LIMITED",
            SecurityEventType::IntegrityScan => "INTEGRITY_SCAN",
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityEventType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        SecurityEventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == value)
            .ok_or_else(|| format!("unknown security event type: {}", value))
    }
}

/// Immutable audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub event_type: SecurityEventType,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SecurityEvent {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let event_type: String = row.try_get("event_type")?;
        let event_type = event_type.parse::<SecurityEventType>().map_err(|e| {
            sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e,
            )))
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            event_type,
            ip: row.try_get("ip")?,
            user_agent: row.try_get("user_agent")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Input for recording a new event
#[derive(Debug, Clone)]
pub struct NewSecurityEvent {
    pub user_id: Option<Uuid>,
    pub event_type: SecurityEventType,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: serde_json::Value,
}

impl NewSecurityEvent {
    pub fn new(event_type: SecurityEventType) -> Self {
        Self {
            user_id: None,
            event_type,
            ip: None,
            user_agent: None,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn ip(mut self, ip: Option<&str>) -> Self {
        self.ip = ip.map(|s| s.to_string());
        self
    }

    pub fn user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.user_agent = user_agent.map(|s| s.to_string());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Assigns an id and the creation time
    pub fn into_event(self, created_at: DateTime<Utc>) -> SecurityEvent {
        SecurityEvent {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            event_type: self.event_type,
            ip: self.ip,
            user_agent: self.user_agent,
            metadata: self.metadata,
            created_at,
        }
    }
}

/// Event query filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityEventFilters {
    pub user_id: Option<Uuid>,
    pub event_type: Option<SecurityEventType>,
    pub event_types: Option<Vec<SecurityEventType>>,
    pub ip: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl SecurityEventFilters {
    /// All filters must hold for the event to match
    pub fn matches(&self, event: &SecurityEvent) -> bool {
        if let Some(user_id) = self.user_id {
            if event.user_id != Some(user_id) {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        if let Some(ip) = &self.ip {
            if event.ip.as_deref() != Some(ip.as_str()) {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if event.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if event.created_at > end {
                return false;
            }
        }
        true
    }
}

/// A page of events plus the unpaginated total
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEventPage {
    pub events: Vec<SecurityEvent>,
    pub total: i64,
}

/// Aggregate counts over a time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecurityStatistics {
    pub window_hours: i64,
    pub failed_logins: i64,
    pub locked_accounts: i64,
    pub blocked_requests: i64,
}

/// Subject of a brute-force lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginSubject {
    User(Uuid),
    Ip(String),
}
