use quiz_core::model::{QuizSummary, UserId};

use super::{
    SqliteRepository,
    mapping::{map_subject_row, map_summary_row},
};
use crate::repository::{StorageError, SummaryRepository};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl SummaryRepository for SqliteRepository {
    async fn append_summary(&self, summary: &QuizSummary) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO quiz_summaries (
                id, user_id, exam, started_at, completed_at,
                total_answered, total_correct, time_spent_secs
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(summary.id().to_string())
        .bind(summary.user_id().as_str())
        .bind(summary.exam().map(|e| e.as_str().to_owned()))
        .bind(summary.started_at())
        .bind(summary.completed_at())
        .bind(i64::from(summary.total_answered()))
        .bind(i64::from(summary.total_correct()))
        .bind(i64::from(summary.time_spent_secs()))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        for subject in summary.subjects() {
            sqlx::query(
                r"
                INSERT INTO summary_subjects (summary_id, subject, total, correct)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(summary.id().to_string())
            .bind(&subject.subject)
            .bind(i64::from(subject.total))
            .bind(i64::from(subject.correct))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn summaries_for_user(
        &self,
        user: &UserId,
        limit: u32,
    ) -> Result<Vec<QuizSummary>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                id, user_id, exam, started_at, completed_at,
                total_answered, total_correct, time_spent_secs
            FROM quiz_summaries
            WHERE user_id = ?1
            ORDER BY completed_at DESC, id DESC
            LIMIT ?2
            ",
        )
        .bind(user.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = sqlx::Row::try_get(&row, "id")
                .map_err(|e| StorageError::Serialization(e.to_string()))?;

            let subject_rows = sqlx::query(
                r"
                SELECT subject, total, correct
                FROM summary_subjects
                WHERE summary_id = ?1
                ORDER BY subject ASC
                ",
            )
            .bind(&id)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

            let mut subjects = Vec::with_capacity(subject_rows.len());
            for subject_row in subject_rows {
                subjects.push(map_subject_row(&subject_row)?);
            }

            out.push(map_summary_row(&row, subjects)?);
        }

        Ok(out)
    }
}
