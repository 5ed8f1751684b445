//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    http::{HeaderName, HeaderValue},
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer, limit::RequestBodyLimitLayer,
    set_header::SetResponseHeaderLayer, trace::TraceLayer,
};

use crate::{
    auth::middleware::{jwt_auth_middleware, require_admin_middleware},
    handlers,
    middleware::{request_tracking_middleware, security_gate_middleware, AppState},
};

/// 请求体上限
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    // 管理端（需要 admin 角色）
    let admin_routes = Router::new()
        // 限流配置
        .route(
            "/api/v1/security/rate-limits",
            get(handlers::rate_limits::list_configs)
                .put(handlers::rate_limits::upsert_config)
                .delete(handlers::rate_limits::delete_config),
        )
        .route(
            "/api/v1/security/rate-limits/violations",
            get(handlers::rate_limits::list_violations),
        )
        // IP 封禁
        .route(
            "/api/v1/security/ip-blocks",
            get(handlers::ip_blocks::list_blocks).post(handlers::ip_blocks::block_ip),
        )
        .route(
            "/api/v1/security/ip-blocks/{ip}",
            delete(handlers::ip_blocks::unblock_ip),
        )
        // 会话
        .route("/api/v1/security/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/api/v1/security/sessions/{id}",
            delete(handlers::sessions::force_logout),
        )
        .route(
            "/api/v1/security/users/{user_id}/sessions",
            delete(handlers::sessions::force_logout_user),
        )
        // 账号锁定
        .route(
            "/api/v1/security/users/{user_id}/lock",
            post(handlers::accounts::lock_account).delete(handlers::accounts::unlock_account),
        )
        // 密码策略
        .route(
            "/api/v1/security/password-policy",
            get(handlers::password_policy::get_policy).put(handlers::password_policy::update_policy),
        )
        .route(
            "/api/v1/security/password-policy/validate",
            post(handlers::password_policy::validate_password),
        )
        .route(
            "/api/v1/security/users/{user_id}/password-expiry",
            get(handlers::password_policy::password_expiry),
        )
        // 文件完整性
        .route(
            "/api/v1/security/integrity/baseline",
            post(handlers::integrity::generate_baseline),
        )
        .route("/api/v1/security/integrity/scan", post(handlers::integrity::scan))
        // 事件与面板
        .route("/api/v1/security/events", get(handlers::events::list_events))
        .route(
            "/api/v1/security/events/statistics",
            get(handlers::events::statistics),
        )
        .route("/api/v1/security/dashboard", get(handlers::dashboard::overview))
        .route("/api/v1/security/risk", get(handlers::dashboard::risk_assessment))
        .route_layer(axum::middleware::from_fn(require_admin_middleware));

    // 当前用户（只需登录）
    let account_routes = Router::new()
        .route("/api/v1/account/2fa", get(handlers::two_factor::status))
        .route("/api/v1/account/2fa/setup", post(handlers::two_factor::setup))
        .route("/api/v1/account/2fa/enable", post(handlers::two_factor::enable))
        .route("/api/v1/account/2fa/disable", post(handlers::two_factor::disable))
        .route("/api/v1/account/2fa/verify", post(handlers::two_factor::verify))
        .route(
            "/api/v1/account/2fa/recovery-codes",
            post(handlers::two_factor::regenerate_recovery_codes),
        )
        .route("/api/v1/account/sessions", get(handlers::sessions::list_my_sessions))
        .route(
            "/api/v1/account/sessions/{id}",
            delete(handlers::sessions::logout_my_session),
        );

    let authenticated_routes = Router::new()
        .merge(admin_routes)
        .merge(account_routes)
        .route_layer(axum::middleware::from_fn_with_state(
            state.jwt_service.clone(),
            jwt_auth_middleware,
        ));

    let router = Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            security_gate_middleware,
        ));

    // 安全头需覆盖闸门拒绝的响应，放在闸门外层
    let router = apply_security_headers(router, &state.config.security.security_headers);

    router
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_tracking_middleware))
        .with_state(state)
}

fn apply_security_headers(mut router: Router<Arc<AppState>>, headers: &[String]) -> Router<Arc<AppState>> {
    for (name, value) in headers.iter().filter_map(|line| parse_header_line(line)) {
        router = router.layer(SetResponseHeaderLayer::if_not_present(name, value));
    }
    router
}

/// 解析 "Name: value" 形式的配置项
fn parse_header_line(line: &str) -> Option<(HeaderName, HeaderValue)> {
    let (name, value) = line.split_once(':')?;
    let parsed = HeaderName::from_bytes(name.trim().as_bytes())
        .ok()
        .zip(HeaderValue::from_str(value.trim()).ok());

    if parsed.is_none() {
        tracing::warn!(header = %line, "Ignoring invalid security header");
    }
    parsed
}
