use chrono::Utc;
use sqlx::Row;

use quiz_core::model::UserId;

use super::SqliteRepository;
use crate::repository::{ProgressStore, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl ProgressStore for SqliteRepository {
    async fn get(&self, user: &UserId) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT blob FROM progress_blobs WHERE user_id = ?1")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.map(|r| {
            r.try_get::<String, _>("blob")
                .map_err(|e| StorageError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn set(&self, user: &UserId, blob: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO progress_blobs (user_id, blob, saved_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                blob = excluded.blob,
                saved_at = excluded.saved_at
            ",
        )
        .bind(user.as_str())
        .bind(blob)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn clear(&self, user: &UserId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM progress_blobs WHERE user_id = ?1")
            .bind(user.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
