//! Session domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserSummary;

/// Active login session
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Session plus owner identity for admin display
#[derive(Debug, Clone, Serialize)]
pub struct SessionWithOwner {
    #[serde(flatten)]
    pub session: Session,
    pub owner: UserSummary,
}

/// Who asked for a forced logout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoutInitiator {
    #[serde(rename = "self")]
    SelfService,
    Admin,
}

impl LogoutInitiator {
    /// Self-initiated when the actor owns the session, otherwise administrative
    pub fn resolve(owner: Uuid, actor: Option<Uuid>) -> Self {
        match actor {
            Some(actor) if actor != owner => LogoutInitiator::Admin,
            _ => LogoutInitiator::SelfService,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogoutInitiator::SelfService => "self",
            LogoutInitiator::Admin => "admin",
        }
    }
}
