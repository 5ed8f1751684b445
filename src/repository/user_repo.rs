//! User security repository (用户安全字段数据访问)

use crate::{
    error::AppError,
    models::user::{AdminTwoFactorCoverage, UserSecurity, ADMIN_ROLE},
    repository::store::UserSecurityStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

const USER_SECURITY_COLUMNS: &str = "id, username, email, role, password_hash, two_factor_enabled, \
     two_factor_secret, recovery_code_hashes, locked_until";

pub struct PgUserSecurityRepository {
    db: PgPool,
}

impl PgUserSecurityRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserSecurityStore for PgUserSecurityRepository {
    /// 根据 ID 查找用户
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserSecurity>, AppError> {
        let user = sqlx::query_as::<_, UserSecurity>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_SECURITY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    /// 根据用户名查找用户
    async fn find_by_username(&self, username: &str) -> Result<Option<UserSecurity>, AppError> {
        let user = sqlx::query_as::<_, UserSecurity>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_SECURITY_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    async fn enable_two_factor(
        &self,
        id: Uuid,
        secret: &str,
        recovery_code_hashes: &[String],
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET two_factor_enabled = TRUE,
                two_factor_secret = $2,
                recovery_code_hashes = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(secret)
        .bind(recovery_code_hashes)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn disable_two_factor(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET two_factor_enabled = FALSE,
                two_factor_secret = NULL,
                recovery_code_hashes = '{}'
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace_recovery_codes(
        &self,
        id: Uuid,
        recovery_code_hashes: &[String],
    ) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET recovery_code_hashes = $2 WHERE id = $1")
            .bind(id)
            .bind(recovery_code_hashes)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 原子消费: 仅当该 hash 仍存在时才移除
    async fn consume_recovery_code(&self, id: Uuid, code_hash: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET recovery_code_hashes = array_remove(recovery_code_hashes, $2)
            WHERE id = $1 AND $2 = ANY(recovery_code_hashes)
            "#,
        )
        .bind(id)
        .bind(code_hash)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn lock_account(&self, id: Uuid, until: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET locked_until = $2 WHERE id = $1")
            .bind(id)
            .bind(until)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn unlock_account(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET locked_until = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_locked(&self, now: DateTime<Utc>) -> Result<i64, AppError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) FROM users WHERE locked_until > $1")
            .bind(now)
            .fetch_one(&self.db)
            .await?
            .get(0);

        Ok(count)
    }

    async fn admin_two_factor_coverage(&self) -> Result<AdminTwoFactorCoverage, AppError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_admins,
                COUNT(*) FILTER (WHERE two_factor_enabled) AS admins_with_two_factor
            FROM users
            WHERE role = $1
            "#,
        )
        .bind(ADMIN_ROLE)
        .fetch_one(&self.db)
        .await?;

        Ok(AdminTwoFactorCoverage {
            total_admins: row.try_get("total_admins")?,
            admins_with_two_factor: row.try_get("admins_with_two_factor")?,
        })
    }
}
