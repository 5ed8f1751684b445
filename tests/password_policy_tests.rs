//! 密码策略集成测试：组成规则、历史复用、泄露检查

use chrono::{Duration, Utc};
use std::time::Duration as StdDuration;
use trust_core::{
    error::AppError,
    models::{
        password_policy::PasswordPolicyConfig,
        security_event::{SecurityEventFilters, SecurityEventType},
    },
};
use uuid::Uuid;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

mod common;
use common::{create_test_config, TestApp};

// SHA-1("password") = 5BAA6 1E4C9B93F3F0682250B6CF8331B7EE68FD8
const PASSWORD_PREFIX_PATH: &str = "/range/5BAA6";
const PASSWORD_SUFFIX: &str = "1E4C9B93F3F0682250B6CF8331B7EE68FD8";

fn offline_policy() -> PasswordPolicyConfig {
    PasswordPolicyConfig {
        check_breached: false,
        ..Default::default()
    }
}

/// 只启用泄露检查，其他规则全部放开
fn breach_only_policy() -> PasswordPolicyConfig {
    PasswordPolicyConfig {
        min_length: 1,
        require_upper: false,
        require_lower: false,
        require_digit: false,
        require_special: false,
        prevent_reuse: 0,
        check_breached: true,
        ..Default::default()
    }
}

async fn app_with_breach_server(server: &MockServer, timeout_ms: u64) -> TestApp {
    let mut config = create_test_config();
    config.security.breach_api_url = format!("{}/range", server.uri());
    config.security.breach_timeout_ms = timeout_ms;

    let app = TestApp::with_config(config);
    app.state
        .password_policy
        .update_policy(breach_only_policy(), None)
        .await
        .unwrap();
    app
}

#[tokio::test]
async fn test_policy_not_found_until_configured() {
    let app = TestApp::new();
    let service = &app.state.password_policy;

    assert!(matches!(service.get_policy().await, Err(AppError::NotFound(_))));
    // 未配置时按默认策略校验
    assert_eq!(service.effective_policy().await.unwrap().min_length, 8);

    let admin = Uuid::new_v4();
    let policy = PasswordPolicyConfig {
        min_length: 14,
        ..offline_policy()
    };
    service.update_policy(policy, Some(admin)).await.unwrap();
    assert_eq!(service.get_policy().await.unwrap().min_length, 14);

    let page = app
        .state
        .events
        .query(
            &SecurityEventFilters {
                event_type: Some(SecurityEventType::PolicyUpdated),
                ..Default::default()
            },
            10,
            0,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.events[0].user_id, Some(admin));
}

#[tokio::test]
async fn test_validation_reports_every_violation() {
    let app = TestApp::new();
    let service = &app.state.password_policy;
    service
        .update_policy(
            PasswordPolicyConfig {
                min_length: 12,
                require_special: true,
                ..offline_policy()
            },
            None,
        )
        .await
        .unwrap();

    let result = service.validate("short", None).await.unwrap();
    assert!(!result.valid);
    // 长度、大写、数字、特殊字符
    assert_eq!(result.errors.len(), 4);

    let result = service.validate("Long-Enough-Pass-1", None).await.unwrap();
    assert!(result.valid);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_disabled_policy_accepts_anything() {
    let app = TestApp::new();
    let service = &app.state.password_policy;
    service
        .update_policy(
            PasswordPolicyConfig {
                enabled: false,
                ..offline_policy()
            },
            None,
        )
        .await
        .unwrap();

    let result = service.validate("a", None).await.unwrap();
    assert!(result.valid);
}

#[tokio::test]
async fn test_reuse_window_follows_history_length() {
    let app = TestApp::new();
    let service = &app.state.password_policy;
    service.update_policy(offline_policy(), None).await.unwrap();

    let user_id = Uuid::new_v4();
    let t0 = Utc::now() - Duration::days(1);
    let passwords: Vec<String> = (0..6).map(|i| format!("Rotating{}Pass", i)).collect();

    for (i, password) in passwords.iter().take(5).enumerate() {
        let hash = app.hasher.hash(password).unwrap();
        service
            .add_to_history_at(user_id, &hash, t0 + Duration::minutes(i as i64))
            .await
            .unwrap();
    }

    let reused = service.validate(&passwords[0], Some(user_id)).await.unwrap();
    assert!(!reused.valid);
    assert!(reused.errors[0].contains("last 5 passwords"));

    // 第六次修改把最旧的一条挤出窗口
    let hash = app.hasher.hash(&passwords[5]).unwrap();
    service
        .add_to_history_at(user_id, &hash, t0 + Duration::minutes(5))
        .await
        .unwrap();

    assert!(service.validate(&passwords[0], Some(user_id)).await.unwrap().valid);
    assert!(!service.validate(&passwords[1], Some(user_id)).await.unwrap().valid);

    // 其他用户不受影响
    assert!(service
        .validate(&passwords[1], Some(Uuid::new_v4()))
        .await
        .unwrap()
        .valid);
}

#[tokio::test]
async fn test_expiry_from_latest_change() {
    let app = TestApp::new();
    let service = &app.state.password_policy;
    service
        .update_policy(
            PasswordPolicyConfig {
                expiration_days: Some(90),
                ..offline_policy()
            },
            None,
        )
        .await
        .unwrap();

    let user_id = Uuid::new_v4();
    // 没有历史记录不算过期
    assert!(!service.is_expired(user_id).await.unwrap());

    let changed_at = Utc::now() - Duration::days(10);
    let hash = app.hasher.hash("Rotating0Pass").unwrap();
    service.add_to_history_at(user_id, &hash, changed_at).await.unwrap();

    assert!(!service
        .is_expired_at(user_id, changed_at + Duration::days(90))
        .await
        .unwrap());
    assert!(service
        .is_expired_at(user_id, changed_at + Duration::days(91))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_breached_password_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PASSWORD_PREFIX_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "0018A45C4D1DEF81644B54AB7F969B88D65:1\r\n{}:3861493\r\n",
            PASSWORD_SUFFIX
        )))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_with_breach_server(&server, 2_000).await;
    let result = app.state.password_policy.validate("password", None).await.unwrap();

    assert!(!result.valid);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("breach"));
}

#[tokio::test]
async fn test_unlisted_password_passes_breach_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PASSWORD_PREFIX_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("0018A45C4D1DEF81644B54AB7F969B88D65:1\r\n"),
        )
        .mount(&server)
        .await;

    let app = app_with_breach_server(&server, 2_000).await;
    let result = app.state.password_policy.validate("password", None).await.unwrap();
    assert!(result.valid);
}

#[tokio::test]
async fn test_breach_lookup_fails_open_on_timeout_and_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PASSWORD_PREFIX_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("{}:10\r\n", PASSWORD_SUFFIX))
                .set_delay(StdDuration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let app = app_with_breach_server(&server, 200).await;
    let started = std::time::Instant::now();
    let result = app.state.password_policy.validate("password", None).await.unwrap();
    assert!(result.valid);
    assert!(started.elapsed() < StdDuration::from_secs(3));

    // 上游 5xx 同样视为未泄露
    let failing = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&failing)
        .await;

    let app = app_with_breach_server(&failing, 2_000).await;
    assert!(app.state.password_policy.validate("password", None).await.unwrap().valid);
}
