//! PostgreSQL 仓库层测试
//!
//! 需要可用的数据库：`TEST_DATABASE_URL=... cargo test -- --ignored`

use chrono::{Duration, Utc};
use serial_test::serial;
use sqlx::PgPool;
use std::sync::Arc;
use trust_core::{
    models::{
        ip_block::BlockedIp,
        password_policy::{PasswordHistoryEntry, PasswordPolicyConfig},
        security_event::{NewSecurityEvent, SecurityEventFilters, SecurityEventType},
        session::Session,
    },
    repository::{
        BlockedIpStore, PasswordPolicyStore, PgBlockedIpRepository, PgPasswordPolicyRepository,
        PgRateLedger, PgSecurityEventRepository, PgSessionRepository, PgUserSecurityRepository,
        SecurityEventStore, SessionStore, UserSecurityStore,
    },
    services::RateLedger,
};
use uuid::Uuid;

mod common;
use common::{create_test_config, setup_test_db};

async fn test_pool() -> PgPool {
    setup_test_db(&create_test_config()).await
}

async fn insert_user(pool: &PgPool, role: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, username, email, role, password_hash) VALUES ($1, $2, $3, $4, $5)")
        .bind(id)
        .bind(format!("user-{}", id))
        .bind(format!("{}@example.com", id))
        .bind(role)
        .bind("not-a-real-hash")
        .execute(pool)
        .await
        .unwrap();
    id
}

/// 每个测试用独立的 IP，避免互相干扰
fn unique_ip() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    format!("10.{}.{}.{}", bytes[0], bytes[1], bytes[2])
}

#[tokio::test]
#[ignore]
async fn test_blocked_ip_upsert_and_expiry() {
    let pool = test_pool().await;
    let repo = PgBlockedIpRepository::new(pool);
    let ip = unique_ip();
    let now = Utc::now();

    repo.upsert(&BlockedIp {
        ip: ip.clone(),
        reason: "first".to_string(),
        expires_at: Some(now + Duration::minutes(5)),
        created_at: now,
    })
    .await
    .unwrap();
    repo.upsert(&BlockedIp {
        ip: ip.clone(),
        reason: "second".to_string(),
        expires_at: Some(now + Duration::minutes(1)),
        created_at: now,
    })
    .await
    .unwrap();

    let found = repo.find(&ip).await.unwrap().unwrap();
    assert_eq!(found.reason, "second");

    repo.delete_expired(now + Duration::minutes(2)).await.unwrap();
    assert!(repo.find(&ip).await.unwrap().is_none());
    assert!(!repo.delete(&ip).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_blocked_ip_delete_if_expired_spares_fresh_rows() {
    let pool = test_pool().await;
    let repo = PgBlockedIpRepository::new(pool);
    let ip = unique_ip();
    let now = Utc::now();

    repo.upsert(&BlockedIp {
        ip: ip.clone(),
        reason: "stale".to_string(),
        expires_at: Some(now - Duration::minutes(1)),
        created_at: now - Duration::hours(1),
    })
    .await
    .unwrap();

    // 重新封禁覆盖了过期记录，条件删除不应生效
    repo.upsert(&BlockedIp {
        ip: ip.clone(),
        reason: "fresh".to_string(),
        expires_at: Some(now + Duration::minutes(30)),
        created_at: now,
    })
    .await
    .unwrap();
    assert!(!repo.delete_if_expired(&ip, now).await.unwrap());
    assert_eq!(repo.find(&ip).await.unwrap().unwrap().reason, "fresh");

    repo.upsert(&BlockedIp {
        ip: ip.clone(),
        reason: "permanent".to_string(),
        expires_at: None,
        created_at: now,
    })
    .await
    .unwrap();
    assert!(!repo.delete_if_expired(&ip, now + Duration::days(365)).await.unwrap());

    repo.upsert(&BlockedIp {
        ip: ip.clone(),
        reason: "short".to_string(),
        expires_at: Some(now + Duration::minutes(1)),
        created_at: now,
    })
    .await
    .unwrap();
    assert!(repo.delete_if_expired(&ip, now + Duration::minutes(2)).await.unwrap());
    assert!(repo.find(&ip).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_event_query_filters_and_order() {
    let pool = test_pool().await;
    let repo = PgSecurityEventRepository::new(pool);
    let user_id = Uuid::new_v4();

    for i in 0..3 {
        let event = NewSecurityEvent::new(SecurityEventType::LoginFailed)
            .user(Some(user_id))
            .metadata(serde_json::json!({ "seq": i }))
            .into_event(Utc::now() + Duration::milliseconds(i));
        repo.insert(&event).await.unwrap();
    }
    repo.insert(
        &NewSecurityEvent::new(SecurityEventType::LoginSuccess)
            .user(Some(user_id))
            .into_event(Utc::now()),
    )
    .await
    .unwrap();

    let filters = SecurityEventFilters {
        user_id: Some(user_id),
        event_type: Some(SecurityEventType::LoginFailed),
        ..Default::default()
    };
    assert_eq!(repo.count(&filters).await.unwrap(), 3);

    let events = repo.query(&filters, 2, 0).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].metadata["seq"], 2);
    assert_eq!(events[0].event_type, SecurityEventType::LoginFailed);
}

#[tokio::test]
#[ignore]
async fn test_recovery_code_consumed_once() {
    let pool = test_pool().await;
    let repo = PgUserSecurityRepository::new(pool.clone());
    let user_id = insert_user(&pool, "admin").await;

    let hashes = vec!["hash-a".to_string(), "hash-b".to_string()];
    assert!(repo
        .enable_two_factor(user_id, "JBSWY3DPEHPK3PXP", &hashes)
        .await
        .unwrap());

    assert!(repo.consume_recovery_code(user_id, "hash-a").await.unwrap());
    assert!(!repo.consume_recovery_code(user_id, "hash-a").await.unwrap());

    let user = repo.find_by_id(user_id).await.unwrap().unwrap();
    assert!(user.two_factor_enabled);
    assert_eq!(user.recovery_code_hashes, vec!["hash-b".to_string()]);

    repo.disable_two_factor(user_id).await.unwrap();
    let user = repo.find_by_id(user_id).await.unwrap().unwrap();
    assert!(!user.two_factor_enabled);
    assert!(user.two_factor_secret.is_none());
    assert!(user.recovery_code_hashes.is_empty());
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_password_history_trim_keeps_newest() {
    let pool = test_pool().await;
    let repo = PgPasswordPolicyRepository::new(pool);
    let user_id = Uuid::new_v4();
    let t0 = Utc::now() - Duration::hours(1);

    for i in 0..4 {
        repo.insert_history(&PasswordHistoryEntry {
            user_id,
            password_hash: format!("hash-{}", i),
            created_at: t0 + Duration::minutes(i),
        })
        .await
        .unwrap();
    }

    assert_eq!(repo.trim_history(user_id, 2).await.unwrap(), 2);
    let recent = repo.recent_history(user_id, 10).await.unwrap();
    let hashes: Vec<&str> = recent.iter().map(|e| e.password_hash.as_str()).collect();
    assert_eq!(hashes, vec!["hash-3", "hash-2"]);

    let policy = PasswordPolicyConfig {
        min_length: 10,
        ..Default::default()
    };
    repo.replace_policy(&policy).await.unwrap();
    assert_eq!(repo.active_policy().await.unwrap().unwrap().min_length, 10);
}

#[tokio::test]
#[ignore]
async fn test_session_lifecycle() {
    let pool = test_pool().await;
    let user_id = insert_user(&pool, "editor").await;
    let repo = PgSessionRepository::new(pool);
    let now = Utc::now();

    let session = Session {
        id: Uuid::new_v4(),
        user_id,
        ip: Some("10.0.0.1".to_string()),
        user_agent: None,
        last_activity: now,
        created_at: now,
        expires_at: now + Duration::hours(1),
    };
    repo.create(&session).await.unwrap();

    let live = repo.list_live(Some(user_id), now).await.unwrap();
    assert_eq!(live.len(), 1);
    assert!(repo.touch(session.id, Some("10.0.0.2"), None, now).await.unwrap());
    assert!(repo
        .list_live(Some(user_id), now + Duration::hours(2))
        .await
        .unwrap()
        .is_empty());

    let deleted = repo.delete(session.id).await.unwrap().unwrap();
    assert_eq!(deleted.user_id, user_id);
    assert!(repo.delete(session.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_shared_ledger_counts_within_window() {
    let pool = test_pool().await;
    let ledger = PgRateLedger::new(pool);
    let ip = unique_ip();
    let window = Duration::seconds(60);
    let t0 = Utc::now();

    for i in 0..3 {
        let count = ledger
            .record_hit(&ip, "/api/login", t0 + Duration::seconds(i), window)
            .await
            .unwrap();
        assert_eq!(count, i as usize + 1);
    }

    // 窗口滑过前三次请求
    let count = ledger
        .record_hit(&ip, "/api/login", t0 + Duration::seconds(90), window)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore]
async fn test_shared_ledger_serializes_concurrent_hits() {
    let pool = test_pool().await;
    let ledger = Arc::new(PgRateLedger::new(pool));
    let ip = unique_ip();
    let now = Utc::now();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let ledger = ledger.clone();
            let ip = ip.clone();
            tokio::spawn(async move {
                ledger
                    .record_hit(&ip, "/api/login", now, Duration::seconds(60))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut counts = Vec::new();
    for handle in handles {
        counts.push(handle.await.unwrap());
    }
    counts.sort_unstable();

    // 每次计数都看到之前全部已提交的请求
    assert_eq!(counts, (1..=20).collect::<Vec<usize>>());
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_shared_ledger_collect_idle_counts_keys() {
    let pool = test_pool().await;
    let ledger = PgRateLedger::new(pool);
    let ip = unique_ip();
    let long_ago = Utc::now() - Duration::days(30);
    let window = Duration::days(1);

    for i in 0..3 {
        ledger
            .record_hit(&ip, "/api/login", long_ago + Duration::seconds(i), window)
            .await
            .unwrap();
    }
    for i in 0..2 {
        ledger
            .record_hit(&ip, "/api/register", long_ago + Duration::seconds(i), window)
            .await
            .unwrap();
    }

    // 五行记录，两个 key
    let removed = ledger.collect_idle(Utc::now(), Duration::days(7)).await.unwrap();
    assert_eq!(removed, 2);
}
