use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (questions, entitlements with grants, progress
/// blobs, quiz summaries, and indexes).
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY,
                    prompt TEXT NOT NULL,
                    option_a TEXT NOT NULL,
                    option_b TEXT NOT NULL,
                    option_c TEXT NOT NULL,
                    option_d TEXT NOT NULL,
                    correct INTEGER NOT NULL CHECK (correct BETWEEN 0 AND 3),
                    explanation TEXT,
                    subject TEXT,
                    exam TEXT,
                    module TEXT,
                    year INTEGER,
                    min_tier TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS entitlements (
                    user_id TEXT PRIMARY KEY,
                    plan TEXT,
                    status TEXT,
                    trial_started_at TEXT,
                    counted_today INTEGER NOT NULL DEFAULT 0 CHECK (counted_today >= 0),
                    counter_date TEXT,
                    original_exam TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS exam_grants (
                    user_id TEXT NOT NULL,
                    exam TEXT NOT NULL,
                    granted_at TEXT NOT NULL,
                    expires_at TEXT,
                    PRIMARY KEY (user_id, exam),
                    FOREIGN KEY (user_id) REFERENCES entitlements(user_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS progress_blobs (
                    user_id TEXT PRIMARY KEY,
                    blob TEXT NOT NULL,
                    saved_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quiz_summaries (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    exam TEXT,
                    started_at TEXT NOT NULL,
                    completed_at TEXT NOT NULL,
                    total_answered INTEGER NOT NULL CHECK (total_answered >= 0),
                    total_correct INTEGER NOT NULL CHECK (total_correct >= 0),
                    time_spent_secs INTEGER NOT NULL CHECK (time_spent_secs >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS summary_subjects (
                    summary_id TEXT NOT NULL,
                    subject TEXT NOT NULL,
                    total INTEGER NOT NULL CHECK (total >= 0),
                    correct INTEGER NOT NULL CHECK (correct >= 0),
                    PRIMARY KEY (summary_id, subject),
                    FOREIGN KEY (summary_id) REFERENCES quiz_summaries(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_questions_exam_subject
                    ON questions(exam, subject);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_exam_grants_user
                    ON exam_grants(user_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_quiz_summaries_user_completed
                    ON quiz_summaries(user_id, completed_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
