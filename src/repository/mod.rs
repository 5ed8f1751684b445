//! Database repository layer

pub mod baseline_repo;
pub mod event_repo;
pub mod ip_block_repo;
pub mod memory;
pub mod password_repo;
pub mod rate_ledger_repo;
pub mod rate_limit_repo;
pub mod session_repo;
pub mod store;
pub mod user_repo;

pub use baseline_repo::*;
pub use event_repo::*;
pub use ip_block_repo::*;
pub use memory::MemoryStore;
pub use password_repo::*;
pub use rate_ledger_repo::*;
pub use rate_limit_repo::*;
pub use session_repo::*;
pub use store::*;
pub use user_repo::*;

use sqlx::PgPool;
use std::sync::Arc;

/// One handle per store trait, shared by the services
#[derive(Clone)]
pub struct StoreSet {
    pub events: Arc<dyn SecurityEventStore>,
    pub blocked_ips: Arc<dyn BlockedIpStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub users: Arc<dyn UserSecurityStore>,
    pub password_policies: Arc<dyn PasswordPolicyStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub baselines: Arc<dyn BaselineStore>,
}

impl StoreSet {
    /// PostgreSQL 存储
    pub fn postgres(db: &PgPool) -> Self {
        Self {
            events: Arc::new(PgSecurityEventRepository::new(db.clone())),
            blocked_ips: Arc::new(PgBlockedIpRepository::new(db.clone())),
            rate_limits: Arc::new(PgRateLimitRepository::new(db.clone())),
            users: Arc::new(PgUserSecurityRepository::new(db.clone())),
            password_policies: Arc::new(PgPasswordPolicyRepository::new(db.clone())),
            sessions: Arc::new(PgSessionRepository::new(db.clone())),
            baselines: Arc::new(PgBaselineRepository::new(db.clone())),
        }
    }

    /// 内存存储，所有 trait 共用同一个 MemoryStore
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            events: store.clone(),
            blocked_ips: store.clone(),
            rate_limits: store.clone(),
            users: store.clone(),
            password_policies: store.clone(),
            sessions: store.clone(),
            baselines: store,
        }
    }
}
