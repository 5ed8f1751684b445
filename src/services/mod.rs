//! Business logic services layer

pub mod breach;
pub mod event_service;
pub mod integrity_service;
pub mod ip_block_service;
pub mod lockout_service;
pub mod password_policy_service;
pub mod rate_ledger;
pub mod rate_limiter;
pub mod risk_service;
pub mod session_service;
pub mod sweeper;
pub mod two_factor_service;

pub use breach::{BreachChecker, BreachDigest};
pub use event_service::EventLog;
pub use integrity_service::IntegrityMonitor;
pub use ip_block_service::IpBlockRegistry;
pub use lockout_service::AccountLockout;
pub use password_policy_service::PasswordPolicyService;
pub use rate_ledger::{InMemoryRateLedger, RateLedger};
pub use rate_limiter::RateLimiter;
pub use risk_service::{RiskAssessor, RiskSettings};
pub use session_service::SessionRegistry;
pub use two_factor_service::TwoFactorService;
