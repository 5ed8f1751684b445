//! Session repository (会话数据访问)

use crate::{
    error::AppError,
    models::{
        session::{Session, SessionWithOwner},
        user::UserSummary,
    },
    repository::store::SessionStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

pub struct PgSessionRepository {
    db: PgPool,
}

impl PgSessionRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn session_with_owner(row: &PgRow) -> Result<SessionWithOwner, sqlx::Error> {
    Ok(SessionWithOwner {
        session: Session {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            ip: row.try_get("ip")?,
            user_agent: row.try_get("user_agent")?,
            last_activity: row.try_get("last_activity")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        },
        owner: UserSummary {
            id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
        },
    })
}

#[async_trait]
impl SessionStore for PgSessionRepository {
    async fn create(&self, session: &Session) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, ip, user_agent, last_activity, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.ip)
        .bind(&session.user_agent)
        .bind(session.last_activity)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 关联用户信息, 按最近活动倒序
    async fn list_live(
        &self,
        user_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionWithOwner>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.user_id, s.ip, s.user_agent, s.last_activity, s.created_at, s.expires_at,
                   u.username, u.email
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.expires_at > $1
              AND ($2::uuid IS NULL OR s.user_id = $2)
            ORDER BY s.last_activity DESC
            "#,
        )
        .bind(now)
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let sessions = rows
            .iter()
            .map(session_with_owner)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sessions)
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            DELETE FROM sessions
            WHERE id = $1
            RETURNING id, user_id, ip, user_agent, last_activity, created_at, expires_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(session)
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// 仅在提供新值时覆盖 ip / user_agent
    async fn touch(
        &self,
        id: Uuid,
        ip: Option<&str>,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET last_activity = $2,
                ip = COALESCE($3, ip),
                user_agent = COALESCE($4, user_agent)
            WHERE id = $1 AND expires_at > $2
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(ip)
        .bind(user_agent)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
