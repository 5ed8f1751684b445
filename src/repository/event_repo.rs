//! Security event repository (安全事件数据访问)

use crate::{
    error::AppError,
    models::security_event::{SecurityEvent, SecurityEventFilters},
    repository::store::SecurityEventStore,
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

pub struct PgSecurityEventRepository {
    db: PgPool,
}

impl PgSecurityEventRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// 拼接过滤条件
fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, filters: &'a SecurityEventFilters) {
    builder.push(" WHERE 1=1");

    if let Some(user_id) = filters.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(event_type) = filters.event_type {
        builder.push(" AND event_type = ").push_bind(event_type.as_str());
    }
    if let Some(types) = &filters.event_types {
        let names: Vec<&'static str> = types.iter().map(|t| t.as_str()).collect();
        builder.push(" AND event_type = ANY(").push_bind(names).push(")");
    }
    if let Some(ip) = &filters.ip {
        builder.push(" AND ip = ").push_bind(ip.as_str());
    }
    if let Some(start_time) = filters.start_time {
        builder.push(" AND created_at >= ").push_bind(start_time);
    }
    if let Some(end_time) = filters.end_time {
        builder.push(" AND created_at <= ").push_bind(end_time);
    }
}

#[async_trait]
impl SecurityEventStore for PgSecurityEventRepository {
    /// 插入安全事件
    async fn insert(&self, event: &SecurityEvent) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO security_events (id, user_id, event_type, ip, user_agent, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(event.event_type.as_str())
        .bind(&event.ip)
        .bind(&event.user_agent)
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 查询安全事件 (按时间倒序)
    async fn query(
        &self,
        filters: &SecurityEventFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SecurityEvent>, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, user_id, event_type, ip, user_agent, metadata, created_at FROM security_events",
        );
        push_filters(&mut builder, filters);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let events = builder
            .build_query_as::<SecurityEvent>()
            .fetch_all(&self.db)
            .await?;

        Ok(events)
    }

    /// 统计安全事件数量
    async fn count(&self, filters: &SecurityEventFilters) -> Result<i64, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM security_events");
        push_filters(&mut builder, filters);

        let count: i64 = builder.build().fetch_one(&self.db).await?.get(0);
        Ok(count)
    }
}
