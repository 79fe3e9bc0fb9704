use sqlx::Row;
use uuid::Uuid;

use quiz_core::model::{ExamId, PlanTier, Question, QuestionId, QuizSummary, SubjectStat, UserId};

use crate::repository::{GrantRecord, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn question_id_to_i64(id: QuestionId) -> Result<i64, StorageError> {
    i64::try_from(id.value())
        .map_err(|_| StorageError::Serialization("question_id overflow".into()))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

/// Strict tier parse for the `min_tier` column.
///
/// Unlike the lenient plan-record interpretation, an unknown stored tier
/// here is a data error, not a default.
pub(crate) fn parse_tier(s: &str) -> Result<PlanTier, StorageError> {
    match s {
        "free" => Ok(PlanTier::Free),
        "trial" => Ok(PlanTier::Trial),
        "individual" => Ok(PlanTier::Individual),
        "plus" => Ok(PlanTier::Plus),
        _ => Err(StorageError::Serialization(format!("invalid tier: {s}"))),
    }
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let id = question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let prompt: String = row.try_get("prompt").map_err(ser)?;
    let options = vec![
        row.try_get::<String, _>("option_a").map_err(ser)?,
        row.try_get::<String, _>("option_b").map_err(ser)?,
        row.try_get::<String, _>("option_c").map_err(ser)?,
        row.try_get::<String, _>("option_d").map_err(ser)?,
    ];
    let correct_i64: i64 = row.try_get("correct").map_err(ser)?;
    let correct = u8::try_from(correct_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid correct: {correct_i64}")))?;

    let mut question = Question::new(id, prompt, options, correct).map_err(ser)?;

    if let Some(explanation) = row
        .try_get::<Option<String>, _>("explanation")
        .map_err(ser)?
    {
        question = question.with_explanation(explanation);
    }
    if let Some(subject) = row.try_get::<Option<String>, _>("subject").map_err(ser)? {
        question = question.with_subject(subject);
    }
    if let Some(exam) = row.try_get::<Option<String>, _>("exam").map_err(ser)? {
        question = question.with_exam(ExamId::new(exam));
    }
    if let Some(module) = row.try_get::<Option<String>, _>("module").map_err(ser)? {
        question = question.with_module(module);
    }
    if let Some(year) = row.try_get::<Option<i64>, _>("year").map_err(ser)? {
        let year = i32::try_from(year)
            .map_err(|_| StorageError::Serialization(format!("invalid year: {year}")))?;
        question = question.with_year(year);
    }
    if let Some(tier) = row.try_get::<Option<String>, _>("min_tier").map_err(ser)? {
        question = question.with_min_tier(parse_tier(&tier)?);
    }

    Ok(question)
}

pub(crate) fn map_grant_row(row: &sqlx::sqlite::SqliteRow) -> Result<GrantRecord, StorageError> {
    Ok(GrantRecord {
        exam: row.try_get("exam").map_err(ser)?,
        granted_at: row.try_get("granted_at").map_err(ser)?,
        expires_at: row.try_get("expires_at").map_err(ser)?,
    })
}

pub(crate) fn map_summary_row(
    row: &sqlx::sqlite::SqliteRow,
    subjects: Vec<SubjectStat>,
) -> Result<QuizSummary, StorageError> {
    let id_str: String = row.try_get("id").map_err(ser)?;
    let id = Uuid::parse_str(&id_str).map_err(ser)?;
    let user_id: String = row.try_get("user_id").map_err(ser)?;
    let exam: Option<String> = row.try_get("exam").map_err(ser)?;

    QuizSummary::from_persisted(
        id,
        UserId::new(user_id),
        exam.map(ExamId::new),
        row.try_get("started_at").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
        u32_from_i64(
            "total_answered",
            row.try_get::<i64, _>("total_answered").map_err(ser)?,
        )?,
        u32_from_i64(
            "total_correct",
            row.try_get::<i64, _>("total_correct").map_err(ser)?,
        )?,
        u32_from_i64(
            "time_spent_secs",
            row.try_get::<i64, _>("time_spent_secs").map_err(ser)?,
        )?,
        subjects,
    )
    .map_err(ser)
}

pub(crate) fn map_subject_row(row: &sqlx::sqlite::SqliteRow) -> Result<SubjectStat, StorageError> {
    Ok(SubjectStat {
        subject: row.try_get("subject").map_err(ser)?,
        total: u32_from_i64("total", row.try_get::<i64, _>("total").map_err(ser)?)?,
        correct: u32_from_i64("correct", row.try_get::<i64, _>("correct").map_err(ser)?)?,
    })
}
