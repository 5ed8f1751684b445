//! Rate limiting domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Fallback config key used when no endpoint-specific row exists
pub const GLOBAL_ENDPOINT: &str = "global";

/// Per-endpoint rate limit config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RateLimitConfig {
    pub endpoint: String,
    pub window_ms: i64,
    pub max_requests: i32,
    pub enabled: bool,
    pub block_duration_minutes: Option<i32>,
}

impl RateLimitConfig {
    /// Seconds a rejected client should wait before retrying
    pub fn retry_after_secs(&self) -> u64 {
        let window_ms = self.window_ms.max(0) as u64;
        window_ms.div_ceil(1000)
    }
}

/// Upsert request (admin API)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertRateLimitRequest {
    #[validate(length(min = 1, max = 255))]
    pub endpoint: String,
    #[validate(range(min = 1, max = 86_400_000))]
    pub window_ms: i64,
    #[validate(range(min = 1))]
    pub max_requests: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[validate(range(min = 1))]
    pub block_duration_minutes: Option<i32>,
}

fn default_enabled() -> bool {
    true
}

impl From<UpsertRateLimitRequest> for RateLimitConfig {
    fn from(req: UpsertRateLimitRequest) -> Self {
        Self {
            endpoint: req.endpoint,
            window_ms: req.window_ms,
            max_requests: req.max_requests,
            enabled: req.enabled,
            block_duration_minutes: req.block_duration_minutes,
        }
    }
}

/// Append-only record of an exceeded window
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RateLimitViolation {
    pub ip: String,
    pub endpoint: String,
    pub request_count: i32,
    #[sqlx(rename = "request_limit")]
    pub limit: i32,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_secs: None,
        }
    }

    pub fn reject(retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            retry_after_secs: Some(retry_after_secs),
        }
    }
}

/// Ledger occupancy snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub tracked_ips: usize,
    pub tracked_keys: usize,
}
