//! Risk assessment models

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// One entry of the check battery
#[derive(Debug, Clone, Serialize)]
pub struct SecurityCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub message: String,
}

impl SecurityCheck {
    pub fn new(name: &'static str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name,
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// High on two or more failures, medium on one failure or two or more warnings
    pub fn from_checks(checks: &[SecurityCheck]) -> Self {
        let failed = checks.iter().filter(|c| c.status == CheckStatus::Fail).count();
        let warned = checks.iter().filter(|c| c.status == CheckStatus::Warn).count();

        if failed >= 2 {
            RiskLevel::High
        } else if failed == 1 || warned >= 2 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub checks: Vec<SecurityCheck>,
    pub assessed_at: DateTime<Utc>,
}

/// Requesting admin's most recent successful login
#[derive(Debug, Clone, Serialize)]
pub struct LastLogin {
    pub at: DateTime<Utc>,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardOverview {
    pub assessment: RiskAssessment,
    pub failed_logins_24h: i64,
    pub failed_logins_7d: i64,
    pub active_blocked_ips: usize,
    pub last_login: Option<LastLogin>,
}
