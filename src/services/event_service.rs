//! 安全事件日志服务

use crate::{
    error::AppError,
    models::security_event::{
        LoginSubject, NewSecurityEvent, SecurityEvent, SecurityEventFilters, SecurityEventPage,
        SecurityEventType, SecurityStatistics,
    },
    repository::store::{SecurityEventStore, UserSecurityStore},
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Upper bound on one page of events
pub const MAX_PAGE_SIZE: i64 = 500;

pub struct EventLog {
    store: Arc<dyn SecurityEventStore>,
    users: Arc<dyn UserSecurityStore>,
}

impl EventLog {
    pub fn new(store: Arc<dyn SecurityEventStore>, users: Arc<dyn UserSecurityStore>) -> Self {
        Self { store, users }
    }

    /// 记录安全事件 (仅追加)
    pub async fn record(&self, event: NewSecurityEvent) -> Result<SecurityEvent, AppError> {
        let event = event.into_event(Utc::now());

        self.store.insert(&event).await?;

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            user_id = ?event.user_id,
            ip = ?event.ip,
            "Security event recorded"
        );

        Ok(event)
    }

    /// 记录登录失败, 供外部认证流程调用
    pub async fn record_failed_login(
        &self,
        user_id: Option<Uuid>,
        username: Option<&str>,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<SecurityEvent, AppError> {
        let metadata = match username {
            Some(username) => serde_json::json!({ "username": username }),
            None => serde_json::json!({}),
        };

        self.record(
            NewSecurityEvent::new(SecurityEventType::LoginFailed)
                .user(user_id)
                .ip(ip)
                .user_agent(user_agent)
                .metadata(metadata),
        )
        .await
    }

    /// 分页查询, 按时间倒序
    pub async fn query(
        &self,
        filters: &SecurityEventFilters,
        limit: i64,
        offset: i64,
    ) -> Result<SecurityEventPage, AppError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = offset.max(0);

        let events = self.store.query(filters, limit, offset).await?;
        let total = self.store.count(filters).await?;

        Ok(SecurityEventPage { events, total })
    }

    pub async fn statistics(&self, window_hours: i64) -> Result<SecurityStatistics, AppError> {
        self.statistics_at(window_hours, Utc::now()).await
    }

    /// Event counts over `[now - window_hours, now]`; locked accounts as of `now`
    pub async fn statistics_at(
        &self,
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<SecurityStatistics, AppError> {
        let window_hours = window_hours.max(1);
        let since = now - Duration::hours(window_hours);

        let failed_logins = self
            .count_types_since(vec![SecurityEventType::LoginFailed], since, now)
            .await?;
        let locked_accounts = self.users.count_locked(now).await?;
        let blocked_requests = self
            .count_types_since(
                vec![SecurityEventType::RequestBlocked, SecurityEventType::RateLimited],
                since,
                now,
            )
            .await?;

        Ok(SecurityStatistics {
            window_hours,
            failed_logins,
            locked_accounts,
            blocked_requests,
        })
    }

    /// 暴力破解检测: 最近窗口内的失败登录次数
    pub async fn recent_failed_logins(
        &self,
        subject: &LoginSubject,
        window_minutes: i64,
    ) -> Result<i64, AppError> {
        self.recent_failed_logins_at(subject, window_minutes, Utc::now())
            .await
    }

    pub async fn recent_failed_logins_at(
        &self,
        subject: &LoginSubject,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let mut filters = SecurityEventFilters {
            event_type: Some(SecurityEventType::LoginFailed),
            start_time: Some(now - Duration::minutes(window_minutes.max(0))),
            end_time: Some(now),
            ..Default::default()
        };
        match subject {
            LoginSubject::User(user_id) => filters.user_id = Some(*user_id),
            LoginSubject::Ip(ip) => filters.ip = Some(ip.clone()),
        }

        self.store.count(&filters).await
    }

    /// Most recent successful login of the user
    pub async fn last_login(&self, user_id: Uuid) -> Result<Option<SecurityEvent>, AppError> {
        let filters = SecurityEventFilters {
            user_id: Some(user_id),
            event_type: Some(SecurityEventType::LoginSuccess),
            ..Default::default()
        };
        let mut events = self.store.query(&filters, 1, 0).await?;
        Ok(events.pop())
    }

    async fn count_types_since(
        &self,
        event_types: Vec<SecurityEventType>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let filters = SecurityEventFilters {
            event_types: Some(event_types),
            start_time: Some(since),
            end_time: Some(until),
            ..Default::default()
        };
        self.store.count(&filters).await
    }
}
