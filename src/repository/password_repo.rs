//! Password policy and history repository

use crate::{
    error::AppError,
    models::password_policy::{PasswordHistoryEntry, PasswordPolicyConfig},
    repository::store::PasswordPolicyStore,
};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgPasswordPolicyRepository {
    db: PgPool,
}

impl PgPasswordPolicyRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PasswordPolicyStore for PgPasswordPolicyRepository {
    async fn active_policy(&self) -> Result<Option<PasswordPolicyConfig>, AppError> {
        let policy = sqlx::query_as::<_, PasswordPolicyConfig>(
            r#"
            SELECT min_length, require_upper, require_lower, require_digit, require_special,
                   expiration_days, prevent_reuse, check_breached, enabled, updated_by, updated_at
            FROM password_policy
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.db)
        .await?;

        Ok(policy)
    }

    /// 单行表, 整体覆盖
    async fn replace_policy(&self, policy: &PasswordPolicyConfig) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO password_policy (
                id, min_length, require_upper, require_lower, require_digit, require_special,
                expiration_days, prevent_reuse, check_breached, enabled, updated_by, updated_at
            )
            VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE
            SET min_length = EXCLUDED.min_length,
                require_upper = EXCLUDED.require_upper,
                require_lower = EXCLUDED.require_lower,
                require_digit = EXCLUDED.require_digit,
                require_special = EXCLUDED.require_special,
                expiration_days = EXCLUDED.expiration_days,
                prevent_reuse = EXCLUDED.prevent_reuse,
                check_breached = EXCLUDED.check_breached,
                enabled = EXCLUDED.enabled,
                updated_by = EXCLUDED.updated_by,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(policy.min_length)
        .bind(policy.require_upper)
        .bind(policy.require_lower)
        .bind(policy.require_digit)
        .bind(policy.require_special)
        .bind(policy.expiration_days)
        .bind(policy.prevent_reuse)
        .bind(policy.check_breached)
        .bind(policy.enabled)
        .bind(policy.updated_by)
        .bind(policy.updated_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn insert_history(&self, entry: &PasswordHistoryEntry) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO password_history (user_id, password_hash, created_at) VALUES ($1, $2, $3)",
        )
        .bind(entry.user_id)
        .bind(&entry.password_hash)
        .bind(entry.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn trim_history(&self, user_id: Uuid, keep: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM password_history
            WHERE user_id = $1
              AND id NOT IN (
                  SELECT id FROM password_history
                  WHERE user_id = $1
                  ORDER BY created_at DESC, id DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(user_id)
        .bind(keep.max(0))
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn recent_history(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PasswordHistoryEntry>, AppError> {
        let entries = sqlx::query_as::<_, PasswordHistoryEntry>(
            r#"
            SELECT user_id, password_hash, created_at
            FROM password_history
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit.max(0))
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }
}
