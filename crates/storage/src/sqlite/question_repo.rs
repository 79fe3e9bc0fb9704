use std::collections::HashMap;

use quiz_core::model::{Question, QuestionFilter, QuestionId};

use super::{
    SqliteRepository,
    mapping::{map_question_row, question_id_to_i64},
};
use crate::repository::{QuestionRepository, StorageError};

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let options = question.options();
        sqlx::query(
            r"
            INSERT INTO questions (
                id, prompt, option_a, option_b, option_c, option_d,
                correct, explanation, subject, exam, module, year, min_tier
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                prompt = excluded.prompt,
                option_a = excluded.option_a,
                option_b = excluded.option_b,
                option_c = excluded.option_c,
                option_d = excluded.option_d,
                correct = excluded.correct,
                explanation = excluded.explanation,
                subject = excluded.subject,
                exam = excluded.exam,
                module = excluded.module,
                year = excluded.year,
                min_tier = excluded.min_tier
            ",
        )
        .bind(question_id_to_i64(question.id())?)
        .bind(question.prompt())
        .bind(&options[0])
        .bind(&options[1])
        .bind(&options[2])
        .bind(&options[3])
        .bind(i64::from(question.correct()))
        .bind(question.explanation())
        .bind(question.subject())
        .bind(question.exam().map(|e| e.as_str().to_owned()))
        .bind(question.module())
        .bind(question.year().map(i64::from))
        .bind(question.min_tier().map(|t| t.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn working_set(&self, filter: &QuestionFilter) -> Result<Vec<Question>, StorageError> {
        let mut sql = String::from(
            r"
            SELECT
                id, prompt, option_a, option_b, option_c, option_d,
                correct, explanation, subject, exam, module, year, min_tier
            FROM questions
            WHERE 1 = 1
            ",
        );

        let mut bind_index = 1;
        if filter.exam.is_some() {
            sql.push_str(" AND exam = ?");
            sql.push_str(&bind_index.to_string());
            bind_index += 1;
        }
        if filter.subject.is_some() {
            sql.push_str(" AND subject = ?");
            sql.push_str(&bind_index.to_string());
            bind_index += 1;
        }
        if filter.module.is_some() {
            sql.push_str(" AND module = ?");
            sql.push_str(&bind_index.to_string());
            bind_index += 1;
        }
        if filter.year.is_some() {
            sql.push_str(" AND year = ?");
            sql.push_str(&bind_index.to_string());
        }
        sql.push_str(" ORDER BY id ASC");

        let mut query = sqlx::query(&sql);
        if let Some(exam) = &filter.exam {
            query = query.bind(exam.as_str().to_owned());
        }
        if let Some(subject) = &filter.subject {
            query = query.bind(subject.clone());
        }
        if let Some(module) = &filter.module {
            query = query.bind(module.clone());
        }
        if let Some(year) = filter.year {
            query = query.bind(i64::from(year));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(map_question_row(&row)?);
        }
        Ok(questions)
    }

    async fn questions_by_ids(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
            SELECT
                id, prompt, option_a, option_b, option_c, option_d,
                correct, explanation, subject, exam, module, year, min_tier
            FROM questions
            WHERE id IN (
            ",
        );

        for i in 0..ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 1).to_string());
        }
        sql.push_str(")\n");

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(question_id_to_i64(*id)?);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut by_id: HashMap<u64, Question> = HashMap::with_capacity(rows.len());
        for row in rows {
            let question = map_question_row(&row)?;
            by_id.insert(question.id().value(), question);
        }

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match by_id.remove(&id.value()) {
                Some(question) => out.push(question),
                None => return Err(StorageError::NotFound),
            }
        }

        Ok(out)
    }
}
