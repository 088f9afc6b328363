use async_trait::async_trait;
use sqlx::PgPool;

use crate::catalog::PhotoCatalog;
use crate::db::error::DatabaseError;

/// Postgres-backed lookups against the `photos`, `albums` and `album_photos` tables.
pub struct PhotoRepository {
    pool: PgPool,
}

impl PhotoRepository {
    pub fn new(pool: &PgPool) -> Self {
        Self { pool: pool.clone() }
    }
}

#[async_trait]
impl PhotoCatalog for PhotoRepository {
    async fn find_photo_id(
        &self,
        key: &str,
        source_candidates: &[String],
    ) -> Result<Option<String>, DatabaseError> {
        let photo_id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM photos
            WHERE storage_key = $1
               OR thumbnail_key = $1
               OR live_photo_video_key = $1
               OR storage_key = ANY($2)
            LIMIT 1
            "#,
        )
        .bind(key)
        .bind(source_candidates)
        .fetch_optional(&self.pool)
        .await?;

        Ok(photo_id)
    }

    async fn is_in_hidden_album(&self, photo_id: &str) -> Result<bool, DatabaseError> {
        let hidden: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM album_photos ap
                INNER JOIN albums a ON a.id = ap.album_id
                WHERE ap.photo_id = $1 AND a.is_hidden
            )
            "#,
        )
        .bind(photo_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(hidden)
    }
}
