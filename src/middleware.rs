//! HTTP 中间件
//! 请求追踪、安全闸门 (IP 封禁 + 限流)

use crate::{
    auth::{jwt::JwtService, password::PasswordHasher},
    config::AppConfig,
    error::AppError,
    models::security_event::{NewSecurityEvent, SecurityEventType},
    repository::StoreSet,
    services::{
        AccountLockout, BreachChecker, EventLog, IntegrityMonitor, IpBlockRegistry,
        PasswordPolicyService, RateLedger, RateLimiter, RiskAssessor, RiskSettings,
        SessionRegistry, TwoFactorService,
    },
};
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::Instrument;
use uuid::Uuid;

/// 应用状态
///
/// 服务均以 Arc 共享，Clone 只复制指针
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// 内存存储模式下为 None
    pub db: Option<PgPool>,
    pub jwt_service: Arc<JwtService>,
    pub events: Arc<EventLog>,
    pub ip_blocks: Arc<IpBlockRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub two_factor: Arc<TwoFactorService>,
    pub password_policy: Arc<PasswordPolicyService>,
    pub sessions: Arc<SessionRegistry>,
    pub lockout: Arc<AccountLockout>,
    pub integrity: Arc<IntegrityMonitor>,
    pub risk: Arc<RiskAssessor>,
}

impl AppState {
    /// 组装所有服务
    pub fn build(
        config: AppConfig,
        db: Option<PgPool>,
        stores: StoreSet,
        ledger: Arc<dyn RateLedger>,
        hasher: Arc<PasswordHasher>,
    ) -> Result<Self, AppError> {
        let jwt_service = Arc::new(JwtService::from_config(&config)?);
        let breach = Arc::new(BreachChecker::new(
            config.security.breach_api_url.clone(),
            Duration::from_millis(config.security.breach_timeout_ms),
        )?);

        let events = Arc::new(EventLog::new(
            stores.events.clone(),
            stores.users.clone(),
        ));
        let ip_blocks = Arc::new(IpBlockRegistry::new(stores.blocked_ips.clone(), events.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(
            stores.rate_limits.clone(),
            ledger,
            ip_blocks.clone(),
        ));
        let two_factor = Arc::new(TwoFactorService::new(
            stores.users.clone(),
            events.clone(),
            hasher.clone(),
            config.security.totp_issuer.clone(),
        ));
        let password_policy = Arc::new(PasswordPolicyService::new(
            stores.password_policies.clone(),
            events.clone(),
            hasher.clone(),
            breach,
        ));
        let sessions = Arc::new(SessionRegistry::new(stores.sessions.clone(), events.clone()));
        let lockout = Arc::new(AccountLockout::new(stores.users.clone(), events.clone()));
        let integrity = Arc::new(IntegrityMonitor::new(
            stores.baselines.clone(),
            events.clone(),
            &config.integrity,
        ));
        let risk = Arc::new(RiskAssessor::new(
            stores.users,
            events.clone(),
            ip_blocks.clone(),
            hasher,
            RiskSettings::from_config(&config),
        ));

        Ok(Self {
            config,
            db,
            jwt_service,
            events,
            ip_blocks,
            rate_limiter,
            two_factor,
            password_policy,
            sessions,
            lockout,
            integrity,
            risk,
        })
    }
}

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，并记录指标
pub async fn request_tracking_middleware(req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    async move {
        let start = Instant::now();
        let mut response = next.run(req).await;
        let elapsed = start.elapsed();

        let status = response.status().as_u16();
        metrics::counter!(
            "trust_core_http_requests_total",
            "method" => method.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        metrics::histogram!("trust_core_http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            status = status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// 安全闸门
///
/// Order: blocklist first (403), then the per-endpoint sliding window (429 with
/// `Retry-After`). Store failures let the request through.
pub async fn security_gate_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let ip = resolve_client_ip(&req, state.config.security.trust_proxy);
    let ip_str = ip.to_string();
    let endpoint = req.uri().path().to_string();
    let user_agent = req
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    req.extensions_mut().insert(ClientIp(ip));

    match state.ip_blocks.is_blocked(&ip_str).await {
        Ok(true) => {
            metrics::counter!("trust_core_gate_denials_total", "reason" => "blocked").increment(1);
            tracing::warn!(client_ip = %ip_str, endpoint = %endpoint, "Request from blocked IP rejected");
            record_denial(
                &state,
                SecurityEventType::RequestBlocked,
                &ip_str,
                user_agent.as_deref(),
                serde_json::json!({ "endpoint": endpoint }),
            )
            .await;
            return AppError::Forbidden.into_response();
        }
        Ok(false) => {}
        Err(e) => {
            tracing::error!(client_ip = %ip_str, error = %e, "Blocklist lookup failed; allowing request");
        }
    }

    match state.rate_limiter.check(&ip_str, &endpoint).await {
        Ok(decision) if !decision.allowed => {
            let retry_after_secs = decision.retry_after_secs.unwrap_or(1);
            metrics::counter!("trust_core_gate_denials_total", "reason" => "rate_limited").increment(1);
            tracing::warn!(
                client_ip = %ip_str,
                endpoint = %endpoint,
                retry_after_secs = retry_after_secs,
                "Rate limit exceeded"
            );
            record_denial(
                &state,
                SecurityEventType::RateLimited,
                &ip_str,
                user_agent.as_deref(),
                serde_json::json!({ "endpoint": endpoint, "retry_after_secs": retry_after_secs }),
            )
            .await;
            return AppError::RateLimitExceeded { retry_after_secs }.into_response();
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(client_ip = %ip_str, error = %e, "Rate limit check failed; allowing request");
        }
    }

    next.run(req).await
}

async fn record_denial(
    state: &AppState,
    event_type: SecurityEventType,
    ip: &str,
    user_agent: Option<&str>,
    metadata: serde_json::Value,
) {
    let event = NewSecurityEvent::new(event_type)
        .ip(Some(ip))
        .user_agent(user_agent)
        .metadata(metadata);

    if let Err(e) = state.events.record(event).await {
        tracing::error!(error = %e, event_type = event_type.as_str(), "Failed to record gate denial");
    }
}

/// 获取客户端 IP
/// 信任代理时依次查看 X-Forwarded-For、X-Real-IP、CF-Connecting-IP，否则取连接地址
fn resolve_client_ip<B>(req: &axum::http::Request<B>, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        if let Some(ip) = ip_from_proxy_headers(req.headers()) {
            return ip;
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn ip_from_proxy_headers(headers: &HeaderMap) -> Option<IpAddr> {
    // X-Forwarded-For 可能包含多个 IP，取第一个
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());

    forwarded
        .or_else(|| header_ip(headers, "x-real-ip"))
        .or_else(|| header_ip(headers, "cf-connecting-ip"))
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// 客户端 IP 提取器（由安全闸门写入请求扩展）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl ClientIp {
    pub fn as_string(&self) -> String {
        self.0.to_string()
    }
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ip) = parts.extensions.get::<ClientIp>() {
            return Ok(*ip);
        }

        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        Ok(ClientIp(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_or_generate_trace_id() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", "test-trace-123".parse().unwrap());

        let trace_id = extract_or_generate_trace_id(&headers);
        assert_eq!(trace_id, "test-trace-123");

        let headers = HeaderMap::new();
        let trace_id = extract_or_generate_trace_id(&headers);
        assert!(!trace_id.is_empty());
        assert_ne!(trace_id, "test-trace-123");
    }

    #[test]
    fn test_proxy_header_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "10.0.0.2".parse().unwrap());
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(
            ip_from_proxy_headers(&headers),
            Some("203.0.113.7".parse().unwrap())
        );

        headers.remove("x-forwarded-for");
        assert_eq!(ip_from_proxy_headers(&headers), Some("10.0.0.2".parse().unwrap()));

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "not-an-ip".parse().unwrap());
        assert_eq!(ip_from_proxy_headers(&headers), None);
    }

    #[test]
    fn test_client_ip_ignores_headers_without_trust_proxy() {
        let req = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.7")
            .body(())
            .unwrap();
        let ip = resolve_client_ip(&req, false);
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::LOCALHOST));

        let ip = resolve_client_ip(&req, true);
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_client_ip_from_connect_info() {
        let mut req = axum::http::Request::builder().body(()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("198.51.100.4:5555".parse::<SocketAddr>().unwrap()));
        let ip = resolve_client_ip(&req, true);
        assert_eq!(ip, "198.51.100.4".parse::<IpAddr>().unwrap());
    }
}
