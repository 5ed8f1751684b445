//! IP blocklist domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Blocked IP row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockedIp {
    pub ip: String,
    pub reason: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl BlockedIp {
    /// Active while there is no expiry or the expiry lies in the future
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now,
        }
    }
}

/// Block request (admin API)
#[derive(Debug, Deserialize, Validate)]
pub struct BlockIpRequest {
    #[validate(length(min = 1, max = 45))]
    pub ip: String,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    pub expires_at: Option<DateTime<Utc>>,
}
