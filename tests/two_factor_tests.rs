//! 两步验证集成测试

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};
use totp_rs::TOTP;
use trust_core::{
    error::AppError,
    models::security_event::{SecurityEventFilters, SecurityEventType},
    services::two_factor_service::build_totp,
};
use uuid::Uuid;

mod common;
use common::TestApp;

const ISSUER: &str = "Trust Core Test";

fn current_code(secret: &str, username: &str) -> String {
    build_totp(secret, ISSUER, username)
        .unwrap()
        .generate_current()
        .unwrap()
}

/// A six-digit code outside the accepted drift window
fn invalid_code(totp: &TOTP) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let accepted: HashSet<String> = (-3i64..=3)
        .map(|step| totp.generate((now as i64 + step * 30) as u64))
        .collect();

    (0..1_000_000u32)
        .map(|n| format!("{:06}", n))
        .find(|candidate| !accepted.contains(candidate))
        .unwrap()
}

async fn count_events(app: &TestApp, user_id: Uuid, event_type: SecurityEventType) -> i64 {
    app.state
        .events
        .query(
            &SecurityEventFilters {
                user_id: Some(user_id),
                event_type: Some(event_type),
                ..Default::default()
            },
            100,
            0,
        )
        .await
        .unwrap()
        .total
}

/// 开启 2FA 并返回 (密钥, 恢复码)
async fn enable_for(app: &TestApp, user_id: Uuid, username: &str) -> (String, Vec<String>) {
    let setup = app.state.two_factor.generate_secret(user_id).await.unwrap();
    let codes = app
        .state
        .two_factor
        .enable(user_id, &setup.secret, &current_code(&setup.secret, username), None)
        .await
        .unwrap();
    (setup.secret, codes)
}

#[tokio::test]
async fn test_setup_returns_secret_and_qr() {
    let app = TestApp::new();
    let user = app.seed_user("alice", "Secret123!", "editor").await;

    let setup = app.state.two_factor.generate_secret(user.id).await.unwrap();
    assert!(setup.secret.len() >= 16);
    assert!(setup.otpauth_url.starts_with("otpauth://totp/"));
    assert!(setup.otpauth_url.contains("alice"));
    assert!(setup.qr_code.starts_with("data:image/png;base64,"));

    // 生成密钥本身不开启 2FA
    let status = app.state.two_factor.status(user.id).await.unwrap();
    assert!(!status.enabled);
}

#[tokio::test]
async fn test_enable_issues_eight_distinct_recovery_codes() {
    let app = TestApp::new();
    let user = app.seed_user("bob", "Secret123!", "editor").await;

    let (secret, codes) = enable_for(&app, user.id, "bob").await;

    assert_eq!(codes.len(), 8);
    let distinct: HashSet<&String> = codes.iter().collect();
    assert_eq!(distinct.len(), 8);
    for code in &codes {
        assert_eq!(code.len(), 9);
        assert_eq!(&code[4..5], "-");
        assert_ne!(code, &secret);
    }

    let status = app.state.two_factor.status(user.id).await.unwrap();
    assert!(status.enabled);
    assert_eq!(status.remaining_recovery_codes, 8);
    assert_eq!(count_events(&app, user.id, SecurityEventType::TwoFaEnabled).await, 1);

    // 已开启时再次开启被拒绝
    let again = app
        .state
        .two_factor
        .enable(user.id, &secret, &current_code(&secret, "bob"), None)
        .await;
    assert!(matches!(again, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn test_enable_with_wrong_token_persists_nothing() {
    let app = TestApp::new();
    let user = app.seed_user("carol", "Secret123!", "editor").await;

    let setup = app.state.two_factor.generate_secret(user.id).await.unwrap();
    let totp = build_totp(&setup.secret, ISSUER, "carol").unwrap();

    let result = app
        .state
        .two_factor
        .enable(user.id, &setup.secret, &invalid_code(&totp), None)
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let status = app.state.two_factor.status(user.id).await.unwrap();
    assert!(!status.enabled);
    assert_eq!(status.remaining_recovery_codes, 0);
    assert_eq!(count_events(&app, user.id, SecurityEventType::TwoFaEnabled).await, 0);
}

#[tokio::test]
async fn test_verify_totp_and_single_use_recovery_code() {
    let app = TestApp::new();
    let user = app.seed_user("dave", "Secret123!", "editor").await;
    let (secret, codes) = enable_for(&app, user.id, "dave").await;
    let two_factor = &app.state.two_factor;

    assert!(two_factor.verify(user.id, &current_code(&secret, "dave")).await.unwrap());

    assert!(two_factor.verify(user.id, &codes[0]).await.unwrap());
    assert_eq!(two_factor.remaining_recovery_codes(user.id).await.unwrap(), 7);

    // 同一恢复码不能再次使用
    assert!(!two_factor.verify(user.id, &codes[0]).await.unwrap());

    // 不区分大小写，分隔符可省略
    let relaxed = codes[1].replace('-', "").to_lowercase();
    assert!(two_factor.verify(user.id, &relaxed).await.unwrap());
    assert_eq!(two_factor.remaining_recovery_codes(user.id).await.unwrap(), 6);

    assert_eq!(count_events(&app, user.id, SecurityEventType::RecoveryCodeUsed).await, 2);
    assert_eq!(count_events(&app, user.id, SecurityEventType::TwoFaFailed).await, 1);
}

#[tokio::test]
async fn test_verify_without_two_factor_is_false() {
    let app = TestApp::new();
    let user = app.seed_user("erin", "Secret123!", "editor").await;

    assert!(!app.state.two_factor.verify(user.id, "123456").await.unwrap());
    assert!(matches!(
        app.state.two_factor.verify(Uuid::new_v4(), "123456").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_disable_requires_password() {
    let app = TestApp::new();
    let user = app.seed_user("frank", "Secret123!", "editor").await;
    enable_for(&app, user.id, "frank").await;

    let wrong = app.state.two_factor.disable(user.id, "not-my-password", None).await;
    assert!(matches!(wrong, Err(AppError::Unauthorized)));
    assert!(app.state.two_factor.status(user.id).await.unwrap().enabled);

    app.state
        .two_factor
        .disable(user.id, "Secret123!", Some("10.0.0.1"))
        .await
        .unwrap();
    let status = app.state.two_factor.status(user.id).await.unwrap();
    assert!(!status.enabled);
    assert_eq!(status.remaining_recovery_codes, 0);
    assert_eq!(count_events(&app, user.id, SecurityEventType::TwoFaDisabled).await, 1);
}

#[tokio::test]
async fn test_regenerate_invalidates_old_codes() {
    let app = TestApp::new();
    let user = app.seed_user("grace", "Secret123!", "editor").await;
    let (secret, old_codes) = enable_for(&app, user.id, "grace").await;
    let two_factor = &app.state.two_factor;

    let totp = build_totp(&secret, ISSUER, "grace").unwrap();
    assert!(matches!(
        two_factor
            .regenerate_recovery_codes(user.id, &invalid_code(&totp), None)
            .await,
        Err(AppError::Unauthorized)
    ));

    let new_codes = two_factor
        .regenerate_recovery_codes(user.id, &current_code(&secret, "grace"), None)
        .await
        .unwrap();
    assert_eq!(new_codes.len(), 8);
    assert_eq!(two_factor.remaining_recovery_codes(user.id).await.unwrap(), 8);

    assert!(!two_factor.verify(user.id, &old_codes[0]).await.unwrap());
    assert!(two_factor.verify(user.id, &new_codes[0]).await.unwrap());
    assert_eq!(
        count_events(&app, user.id, SecurityEventType::RecoveryCodesRegenerated).await,
        1
    );
}
