use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use quiz_core::model::{AccountStatus, ExamId, PlanTier, UserId};

use super::{SqliteRepository, mapping::map_grant_row, mapping::u32_from_i64};
use crate::repository::{EntitlementRecord, EntitlementStore, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

impl SqliteRepository {
    async fn grants_for(&self, user: &UserId) -> Result<Vec<crate::repository::GrantRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT exam, granted_at, expires_at
            FROM exam_grants
            WHERE user_id = ?1
            ORDER BY exam ASC
            ",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut grants = Vec::with_capacity(rows.len());
        for row in rows {
            grants.push(map_grant_row(&row)?);
        }
        Ok(grants)
    }

    async fn ensure_row(&self, user: &UserId) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO entitlements (user_id) VALUES (?1)
            ON CONFLICT(user_id) DO NOTHING
            ",
        )
        .bind(user.as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntitlementStore for SqliteRepository {
    async fn read(&self, user: &UserId) -> Result<Option<EntitlementRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT plan, status, trial_started_at, counted_today, counter_date, original_exam
            FROM entitlements
            WHERE user_id = ?1
            ",
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let counted_today = u32_from_i64(
            "counted_today",
            row.try_get::<i64, _>("counted_today")
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
        )?;

        Ok(Some(EntitlementRecord {
            user_id: user.clone(),
            plan: row
                .try_get("plan")
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            status: row
                .try_get("status")
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            trial_started_at: row
                .try_get("trial_started_at")
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            counted_today,
            counter_date: row
                .try_get("counter_date")
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            original_exam: row
                .try_get("original_exam")
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            grants: self.grants_for(user).await?,
        }))
    }

    async fn write_record(&self, record: &EntitlementRecord) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO entitlements (
                user_id, plan, status, trial_started_at, counted_today,
                counter_date, original_exam
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(user_id) DO UPDATE SET
                plan = excluded.plan,
                status = excluded.status,
                trial_started_at = excluded.trial_started_at,
                counted_today = excluded.counted_today,
                counter_date = excluded.counter_date,
                original_exam = excluded.original_exam
            ",
        )
        .bind(record.user_id.as_str())
        .bind(&record.plan)
        .bind(&record.status)
        .bind(record.trial_started_at)
        .bind(i64::from(record.counted_today))
        .bind(record.counter_date)
        .bind(&record.original_exam)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM exam_grants WHERE user_id = ?1")
            .bind(record.user_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for grant in &record.grants {
            sqlx::query(
                r"
                INSERT INTO exam_grants (user_id, exam, granted_at, expires_at)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(record.user_id.as_str())
            .bind(&grant.exam)
            .bind(grant.granted_at)
            .bind(grant.expires_at)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn increment_quota(&self, user: &UserId, today: NaiveDate) -> Result<u32, StorageError> {
        let row = sqlx::query(
            r"
            INSERT INTO entitlements (user_id, counted_today, counter_date)
            VALUES (?1, 1, ?2)
            ON CONFLICT(user_id) DO UPDATE SET
                counted_today = CASE
                    WHEN entitlements.counter_date IS ?2 THEN entitlements.counted_today + 1
                    ELSE 1
                END,
                counter_date = ?2
            RETURNING counted_today
            ",
        )
        .bind(user.as_str())
        .bind(today)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        u32_from_i64(
            "counted_today",
            row.try_get::<i64, _>("counted_today")
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
        )
    }

    async fn set_plan(
        &self,
        user: &UserId,
        tier: PlanTier,
        original_exam: Option<&ExamId>,
        changed_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO entitlements (user_id, plan, original_exam)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                plan = excluded.plan,
                original_exam = COALESCE(excluded.original_exam, entitlements.original_exam)
            ",
        )
        .bind(user.as_str())
        .bind(tier.as_str())
        .bind(original_exam.map(|e| e.as_str().to_owned()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if tier == PlanTier::Trial {
            sqlx::query(
                r"
                UPDATE entitlements
                SET trial_started_at = ?2
                WHERE user_id = ?1 AND trial_started_at IS NULL
                ",
            )
            .bind(user.as_str())
            .bind(changed_at)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        }

        Ok(())
    }

    async fn write_grant(
        &self,
        user: &UserId,
        exam: &ExamId,
        granted_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        self.ensure_row(user).await?;
        sqlx::query(
            r"
            INSERT INTO exam_grants (user_id, exam, granted_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, exam) DO UPDATE SET
                granted_at = excluded.granted_at,
                expires_at = excluded.expires_at
            ",
        )
        .bind(user.as_str())
        .bind(exam.as_str())
        .bind(granted_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn revoke_grant(&self, user: &UserId, exam: &ExamId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM exam_grants WHERE user_id = ?1 AND exam = ?2")
            .bind(user.as_str())
            .bind(exam.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn set_status(&self, user: &UserId, status: AccountStatus) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO entitlements (user_id, status)
            VALUES (?1, ?2)
            ON CONFLICT(user_id) DO UPDATE SET status = excluded.status
            ",
        )
        .bind(user.as_str())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn cancel_all_access(&self, user: &UserId) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query("DELETE FROM exam_grants WHERE user_id = ?1")
            .bind(user.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        sqlx::query(
            r"
            UPDATE entitlements
            SET plan = 'free', original_exam = NULL
            WHERE user_id = ?1
            ",
        )
        .bind(user.as_str())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
