//! Integrity baseline repository

use crate::{
    error::AppError,
    models::integrity::{FileFingerprint, IntegrityBaseline},
    repository::store::BaselineStore,
};
use async_trait::async_trait;
use sqlx::{types::Json, PgPool, Row};

pub struct PgBaselineRepository {
    db: PgPool,
}

impl PgBaselineRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BaselineStore for PgBaselineRepository {
    async fn load(&self) -> Result<Option<IntegrityBaseline>, AppError> {
        let row = sqlx::query("SELECT files, created_at FROM integrity_baseline WHERE id = 1")
            .fetch_optional(&self.db)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let Json(files): Json<Vec<FileFingerprint>> = row.try_get("files")?;
        Ok(Some(IntegrityBaseline {
            files,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn replace(&self, baseline: &IntegrityBaseline) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO integrity_baseline (id, files, created_at)
            VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE
            SET files = EXCLUDED.files,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(Json(&baseline.files))
        .bind(baseline.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
