//! IP 封禁、会话、事件统计、账号锁定与风险评估的服务层测试

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use trust_core::{
    error::AppError,
    models::{
        ip_block::BlockedIp,
        risk::{CheckStatus, RiskLevel},
        security_event::{LoginSubject, NewSecurityEvent, SecurityEventFilters, SecurityEventType},
    },
    repository::{BlockedIpStore, MemoryStore},
    services::{EventLog, IpBlockRegistry},
};

mod common;
use common::{create_test_config, TestApp};

// ==================== IP 封禁 ====================

#[tokio::test]
async fn test_block_expiry_and_unblock() {
    let app = TestApp::new();
    let blocks = &app.state.ip_blocks;
    let now = Utc::now();

    blocks
        .block("10.0.0.1", "manual", Some(now + Duration::minutes(5)), None)
        .await
        .unwrap();
    blocks.block("10.0.0.2", "permanent", None, None).await.unwrap();

    assert!(blocks.is_blocked_at("10.0.0.1", now).await.unwrap());
    assert!(blocks.is_blocked_at("10.0.0.2", now).await.unwrap());
    assert!(!blocks.is_blocked_at("10.0.0.3", now).await.unwrap());

    // 过期后视为未封禁，且只剩永久封禁
    let later = now + Duration::minutes(6);
    assert!(!blocks.is_blocked_at("10.0.0.1", later).await.unwrap());
    let active = blocks.list_active_at(later).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].ip, "10.0.0.2");

    blocks.unblock("10.0.0.2", None).await.unwrap();
    assert!(!blocks.is_blocked_at("10.0.0.2", later).await.unwrap());
    assert!(matches!(
        blocks.unblock("10.0.0.2", None).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_reblock_replaces_reason_and_expiry() {
    let app = TestApp::new();
    let blocks = &app.state.ip_blocks;
    let now = Utc::now();

    blocks
        .block("10.0.0.9", "first", Some(now + Duration::minutes(1)), None)
        .await
        .unwrap();
    blocks.block("10.0.0.9", "second", None, None).await.unwrap();

    let active = blocks.list_active_at(now + Duration::minutes(10)).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].reason, "second");
    assert_eq!(active[0].expires_at, None);
}

#[tokio::test]
async fn test_sweep_removes_only_expired_blocks() {
    let app = TestApp::new();
    let blocks = &app.state.ip_blocks;
    let now = Utc::now();

    blocks
        .block("10.1.0.1", "short", Some(now + Duration::seconds(1)), None)
        .await
        .unwrap();
    blocks.block("10.1.0.2", "forever", None, None).await.unwrap();

    let removed = blocks.sweep_expired_at(now + Duration::minutes(1)).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(blocks.list_active_at(now).await.unwrap().len(), 1);
}

// ==================== 会话 ====================

/// 读取到过期记录之后、删除之前，另一个请求重新封禁了同一个 ip
struct ReblockBetweenFindAndDelete {
    inner: Arc<MemoryStore>,
    fresh_until: DateTime<Utc>,
    fired: AtomicBool,
}

#[async_trait]
impl BlockedIpStore for ReblockBetweenFindAndDelete {
    async fn find(&self, ip: &str) -> Result<Option<BlockedIp>, AppError> {
        let seen = self.inner.find(ip).await?;
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.inner
                .upsert(&BlockedIp {
                    ip: ip.to_string(),
                    reason: "reblocked".to_string(),
                    expires_at: Some(self.fresh_until),
                    created_at: Utc::now(),
                })
                .await?;
        }
        Ok(seen)
    }

    async fn upsert(&self, block: &BlockedIp) -> Result<BlockedIp, AppError> {
        self.inner.upsert(block).await
    }

    async fn delete(&self, ip: &str) -> Result<bool, AppError> {
        self.inner.delete(ip).await
    }

    async fn delete_if_expired(&self, ip: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.inner.delete_if_expired(ip, now).await
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<BlockedIp>, AppError> {
        self.inner.list_active(now).await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        self.inner.delete_expired(now).await
    }
}

#[tokio::test]
async fn test_lazy_expiry_keeps_concurrent_reblock() {
    let inner = Arc::new(MemoryStore::new());
    let now = Utc::now();

    inner
        .upsert(&BlockedIp {
            ip: "10.2.0.1".to_string(),
            reason: "stale".to_string(),
            expires_at: Some(now - Duration::minutes(1)),
            created_at: now - Duration::hours(1),
        })
        .await
        .unwrap();

    let store = Arc::new(ReblockBetweenFindAndDelete {
        inner: inner.clone(),
        fresh_until: now + Duration::minutes(30),
        fired: AtomicBool::new(false),
    });
    let events = Arc::new(EventLog::new(inner.clone(), inner.clone()));
    let blocks = IpBlockRegistry::new(store, events);

    // 旧记录已过期，但删除不能带走新的封禁
    assert!(blocks.is_blocked_at("10.2.0.1", now).await.unwrap());

    let current = inner.find("10.2.0.1").await.unwrap().expect("fresh block kept");
    assert_eq!(current.reason, "reblocked");
    assert_eq!(current.expires_at, Some(now + Duration::minutes(30)));
    assert!(blocks.is_blocked_at("10.2.0.1", now).await.unwrap());

    // 新封禁到期后照常惰性删除
    let later = now + Duration::minutes(31);
    assert!(!blocks.is_blocked_at("10.2.0.1", later).await.unwrap());
    assert!(inner.find("10.2.0.1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_force_logout_records_initiator() {
    let app = TestApp::new();
    let alice = app.seed_user("alice", "Secret123!", "editor").await;
    let admin = app.seed_user("root", "Secret123!", "admin").await;
    let sessions = &app.state.sessions;

    let own = sessions
        .create(alice.id, Some("10.0.0.5"), Some("test-agent"), Duration::hours(1))
        .await
        .unwrap();
    let other = sessions
        .create(alice.id, Some("10.0.0.6"), None, Duration::hours(1))
        .await
        .unwrap();

    let listed = sessions.list_all(Some(alice.id)).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].owner.username, "alice");

    sessions.force_logout(own.id, Some(alice.id)).await.unwrap();
    sessions.force_logout(other.id, Some(admin.id)).await.unwrap();

    let page = app
        .state
        .events
        .query(
            &SecurityEventFilters {
                event_type: Some(SecurityEventType::Logout),
                ..Default::default()
            },
            10,
            0,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    let initiators: Vec<&str> = page
        .events
        .iter()
        .filter_map(|e| e.metadata["initiated_by"].as_str())
        .collect();
    assert!(initiators.contains(&"self"));
    assert!(initiators.contains(&"admin"));

    assert!(matches!(
        sessions.force_logout(own.id, None).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_force_logout_all_and_expiry() {
    let app = TestApp::new();
    let bob = app.seed_user("bob", "Secret123!", "editor").await;
    let carol = app.seed_user("carol", "Secret123!", "editor").await;
    let sessions = &app.state.sessions;

    for _ in 0..3 {
        sessions.create(bob.id, None, None, Duration::hours(1)).await.unwrap();
    }
    let short = sessions
        .create(carol.id, None, None, Duration::minutes(1))
        .await
        .unwrap();

    assert_eq!(sessions.force_logout_all(bob.id, None).await.unwrap(), 3);
    assert!(sessions.list_all(Some(bob.id)).await.unwrap().is_empty());

    let later = Utc::now() + Duration::minutes(5);
    assert!(sessions.list_all_at(None, later).await.unwrap().is_empty());
    assert!(sessions.touch(short.id, Some("10.9.9.9"), None).await.unwrap());
    assert_eq!(sessions.sweep_expired_at(later).await.unwrap(), 1);
    assert!(!sessions.touch(short.id, None, None).await.unwrap());
}

// ==================== 事件与统计 ====================

#[tokio::test]
async fn test_statistics_and_failed_login_counts() {
    let app = TestApp::new();
    let events = &app.state.events;
    let user = app.seed_user("dave", "Secret123!", "editor").await;

    for _ in 0..3 {
        events
            .record_failed_login(Some(user.id), Some("dave"), Some("10.2.0.1"), None)
            .await
            .unwrap();
    }
    events
        .record_failed_login(None, Some("ghost"), Some("10.2.0.1"), None)
        .await
        .unwrap();
    app.state
        .lockout
        .lock(user.id, Utc::now() + Duration::minutes(30), "manual", None)
        .await
        .unwrap();
    events
        .record(NewSecurityEvent::new(SecurityEventType::RequestBlocked).ip(Some("10.2.0.1")))
        .await
        .unwrap();
    events
        .record(NewSecurityEvent::new(SecurityEventType::RateLimited).ip(Some("10.2.0.1")))
        .await
        .unwrap();

    let stats = events.statistics(24).await.unwrap();
    assert_eq!(stats.window_hours, 24);
    assert_eq!(stats.failed_logins, 4);
    assert_eq!(stats.locked_accounts, 1);
    assert_eq!(stats.blocked_requests, 2);

    assert_eq!(
        events
            .recent_failed_logins(&LoginSubject::User(user.id), 15)
            .await
            .unwrap(),
        3
    );
    assert_eq!(
        events
            .recent_failed_logins(&LoginSubject::Ip("10.2.0.1".to_string()), 15)
            .await
            .unwrap(),
        4
    );

    // 窗口之外不计入
    let stats = events
        .statistics_at(24, Utc::now() + Duration::hours(25))
        .await
        .unwrap();
    assert_eq!(stats.failed_logins, 0);
}

#[tokio::test]
async fn test_event_query_pagination_newest_first() {
    let app = TestApp::new();
    let events = &app.state.events;

    for i in 0..5 {
        events
            .record(
                NewSecurityEvent::new(SecurityEventType::LoginSuccess)
                    .metadata(serde_json::json!({ "seq": i })),
            )
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let filters = SecurityEventFilters::default();
    let first = events.query(&filters, 2, 0).await.unwrap();
    assert_eq!(first.total, 5);
    assert_eq!(first.events.len(), 2);
    assert_eq!(first.events[0].metadata["seq"], 4);

    let last = events.query(&filters, 2, 4).await.unwrap();
    assert_eq!(last.events.len(), 1);
    assert_eq!(last.events[0].metadata["seq"], 0);
}

// ==================== 账号锁定 ====================

#[tokio::test]
async fn test_lockout_after_repeated_failures() {
    let app = TestApp::new();
    let user = app.seed_user("erin", "Secret123!", "editor").await;

    for _ in 0..4 {
        app.state
            .events
            .record_failed_login(Some(user.id), Some("erin"), None, None)
            .await
            .unwrap();
    }
    let locked = app
        .state
        .lockout
        .lock_if_exceeded(user.id, 15, 5, Duration::minutes(30))
        .await
        .unwrap();
    assert!(!locked);

    app.state
        .events
        .record_failed_login(Some(user.id), Some("erin"), None, None)
        .await
        .unwrap();
    let locked = app
        .state
        .lockout
        .lock_if_exceeded(user.id, 15, 5, Duration::minutes(30))
        .await
        .unwrap();
    assert!(locked);

    let stats = app.state.events.statistics(1).await.unwrap();
    assert_eq!(stats.locked_accounts, 1);

    // 已锁定时不再重复锁定
    app.state
        .events
        .record_failed_login(Some(user.id), Some("erin"), None, None)
        .await
        .unwrap();
    let relocked = app
        .state
        .lockout
        .lock_if_exceeded(user.id, 15, 5, Duration::minutes(30))
        .await
        .unwrap();
    assert!(!relocked);
    let page = app
        .state
        .events
        .query(
            &SecurityEventFilters {
                user_id: Some(user.id),
                event_type: Some(SecurityEventType::AccountLocked),
                ..Default::default()
            },
            10,
            0,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    app.state.lockout.unlock(user.id, None).await.unwrap();
    assert!(matches!(
        app.state.lockout.unlock(uuid::Uuid::new_v4(), None).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_locked_accounts_reflect_current_state() {
    let app = TestApp::new();
    let user = app.seed_user("frank", "Secret123!", "editor").await;
    let other = app.seed_user("gina", "Secret123!", "editor").await;
    let lockout = &app.state.lockout;
    let until = Utc::now() + Duration::minutes(30);

    lockout.lock(user.id, until, "manual", None).await.unwrap();
    lockout.lock(user.id, until, "manual again", None).await.unwrap();
    assert_eq!(app.state.events.statistics(24).await.unwrap().locked_accounts, 1);

    lockout.unlock(user.id, None).await.unwrap();
    assert_eq!(app.state.events.statistics(24).await.unwrap().locked_accounts, 0);

    // 锁定到期后不再计入
    lockout
        .lock(other.id, Utc::now() + Duration::minutes(1), "short", None)
        .await
        .unwrap();
    let stats = app
        .state
        .events
        .statistics_at(24, Utc::now() + Duration::minutes(2))
        .await
        .unwrap();
    assert_eq!(stats.locked_accounts, 0);
}

// ==================== 风险评估 ====================

#[tokio::test]
async fn test_risk_low_for_hardened_setup() {
    let app = TestApp::new();
    let admin = app.seed_user("sec-admin", "Str0ng!Passw0rd", "admin").await;

    // 管理员开启 2FA（直接写入存储）
    let mut hardened = admin.clone();
    hardened.two_factor_enabled = true;
    hardened.two_factor_secret = Some("JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP".to_string());
    app.store.insert_user(hardened).await;

    let assessment = app.state.risk.assess().await.unwrap();
    assert_eq!(assessment.checks.len(), 6);
    for check in &assessment.checks {
        assert_eq!(check.status, CheckStatus::Pass, "{}: {}", check.name, check.message);
    }
    assert_eq!(assessment.risk_level, RiskLevel::Low);
}

#[tokio::test]
async fn test_risk_high_with_default_admin_and_plain_http() {
    let mut config = create_test_config();
    config.server.public_url = "http://trust.example.com".to_string();
    let app = TestApp::with_config(config);
    app.seed_user("admin", "admin", "admin").await;

    let assessment = app.state.risk.assess().await.unwrap();
    let status_of = |name: &str| {
        assessment
            .checks
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.status)
            .unwrap()
    };

    assert_eq!(status_of("https"), CheckStatus::Fail);
    assert_eq!(status_of("default_admin"), CheckStatus::Fail);
    assert_eq!(status_of("admin_two_factor"), CheckStatus::Fail);
    assert_eq!(assessment.risk_level, RiskLevel::High);
}

#[tokio::test]
async fn test_dashboard_overview_counts() {
    let app = TestApp::new();
    let admin = app.seed_user("boss", "Str0ng!Passw0rd", "admin").await;

    app.state
        .events
        .record(
            NewSecurityEvent::new(SecurityEventType::LoginSuccess)
                .user(Some(admin.id))
                .ip(Some("192.0.2.10")),
        )
        .await
        .unwrap();
    app.state
        .events
        .record_failed_login(Some(admin.id), Some("boss"), None, None)
        .await
        .unwrap();
    app.state
        .ip_blocks
        .block("192.0.2.66", "abuse", None, Some(admin.id))
        .await
        .unwrap();

    let overview = app.state.risk.dashboard_overview(admin.id).await.unwrap();
    assert_eq!(overview.failed_logins_24h, 1);
    assert_eq!(overview.failed_logins_7d, 1);
    assert_eq!(overview.active_blocked_ips, 1);
    let last_login = overview.last_login.unwrap();
    assert_eq!(last_login.ip.as_deref(), Some("192.0.2.10"));
}
