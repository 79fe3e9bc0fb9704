use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::model::answer::AnswerRecord;
use crate::model::ids::{ExamId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SummaryError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("too many answers for a single session: {len}")]
    TooManyAnswers { len: usize },

    #[error("total answered ({total}) is less than correct count ({correct})")]
    CountMismatch { total: u32, correct: u32 },
}

/// Per-subject slice of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectStat {
    pub subject: String,
    pub total: u32,
    pub correct: u32,
}

/// Aggregate summary for a completed quiz run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSummary {
    id: Uuid,
    user_id: UserId,
    exam: Option<ExamId>,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    total_answered: u32,
    total_correct: u32,
    time_spent_secs: u32,
    subjects: Vec<SubjectStat>,
}

impl QuizSummary {
    /// Rehydrate a summary from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SummaryError::CountMismatch` if totals do not align.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: Uuid,
        user_id: UserId,
        exam: Option<ExamId>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        total_answered: u32,
        total_correct: u32,
        time_spent_secs: u32,
        subjects: Vec<SubjectStat>,
    ) -> Result<Self, SummaryError> {
        if completed_at < started_at {
            return Err(SummaryError::InvalidTimeRange);
        }
        if total_correct > total_answered {
            return Err(SummaryError::CountMismatch {
                total: total_answered,
                correct: total_correct,
            });
        }

        Ok(Self {
            id,
            user_id,
            exam,
            started_at,
            completed_at,
            total_answered,
            total_correct,
            time_spent_secs,
            subjects,
        })
    }

    /// Build a summary from a finished run's answer records.
    ///
    /// The subject breakdown uses the tags copied at answer time, so a
    /// later re-tag of a question does not rewrite history.
    ///
    /// # Errors
    ///
    /// Returns `SummaryError::InvalidTimeRange` if `completed_at` precedes
    /// `started_at`, or `SummaryError::TooManyAnswers` if the record count
    /// cannot fit in `u32`.
    pub fn from_answers(
        user_id: UserId,
        exam: Option<ExamId>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        answers: &[AnswerRecord],
    ) -> Result<Self, SummaryError> {
        if completed_at < started_at {
            return Err(SummaryError::InvalidTimeRange);
        }
        let total_answered = u32::try_from(answers.len())
            .map_err(|_| SummaryError::TooManyAnswers { len: answers.len() })?;

        let mut total_correct = 0_u32;
        let mut time_spent_secs = 0_u32;
        let mut by_subject: BTreeMap<&str, (u32, u32)> = BTreeMap::new();

        for answer in answers {
            if answer.correct {
                total_correct = total_correct.saturating_add(1);
            }
            time_spent_secs = time_spent_secs.saturating_add(answer.time_spent_secs);
            if let Some(subject) = answer.subject.as_deref() {
                let entry = by_subject.entry(subject).or_insert((0, 0));
                entry.0 = entry.0.saturating_add(1);
                if answer.correct {
                    entry.1 = entry.1.saturating_add(1);
                }
            }
        }

        let subjects = by_subject
            .into_iter()
            .map(|(subject, (total, correct))| SubjectStat {
                subject: subject.to_owned(),
                total,
                correct,
            })
            .collect();

        Self::from_persisted(
            Uuid::new_v4(),
            user_id,
            exam,
            started_at,
            completed_at,
            total_answered,
            total_correct,
            time_spent_secs,
            subjects,
        )
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn exam(&self) -> Option<&ExamId> {
        self.exam.as_ref()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn total_answered(&self) -> u32 {
        self.total_answered
    }

    #[must_use]
    pub fn total_correct(&self) -> u32 {
        self.total_correct
    }

    #[must_use]
    pub fn time_spent_secs(&self) -> u32 {
        self.time_spent_secs
    }

    #[must_use]
    pub fn subjects(&self) -> &[SubjectStat] {
        &self.subjects
    }

    /// Correct answers as a whole percentage, 0 for an empty run.
    #[must_use]
    pub fn score_percent(&self) -> u32 {
        if self.total_answered == 0 {
            return 0;
        }
        self.total_correct * 100 / self.total_answered
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::answer::Selection;
    use crate::model::ids::QuestionId;
    use crate::model::question::Question;
    use crate::time::fixed_now;

    fn answer(id: u64, subject: &str, correct: bool) -> AnswerRecord {
        let q = Question::new(
            QuestionId::new(id),
            "Prompt?",
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            0,
        )
        .unwrap()
        .with_subject(subject);
        let selection = if correct {
            Selection::Chosen(0)
        } else {
            Selection::Chosen(1)
        };
        AnswerRecord::record(&q, selection, 10, 30)
    }

    #[test]
    fn summary_aggregates_by_subject() {
        let now = fixed_now();
        let answers = vec![
            answer(1, "Português", true),
            answer(2, "Português", false),
            answer(3, "Direito", true),
        ];

        let summary =
            QuizSummary::from_answers(UserId::new("ana"), None, now, now, &answers).unwrap();

        assert_eq!(summary.total_answered(), 3);
        assert_eq!(summary.total_correct(), 2);
        assert_eq!(summary.time_spent_secs(), 30);
        assert_eq!(summary.score_percent(), 66);

        let direito = summary
            .subjects()
            .iter()
            .find(|s| s.subject == "Direito")
            .unwrap();
        assert_eq!((direito.total, direito.correct), (1, 1));
        let portugues = summary
            .subjects()
            .iter()
            .find(|s| s.subject == "Português")
            .unwrap();
        assert_eq!((portugues.total, portugues.correct), (2, 1));
    }

    #[test]
    fn inverted_time_range_is_rejected() {
        let now = fixed_now();
        let err = QuizSummary::from_answers(
            UserId::new("ana"),
            None,
            now,
            now - chrono::Duration::seconds(1),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, SummaryError::InvalidTimeRange));
    }

    #[test]
    fn persisted_counts_must_align() {
        let now = fixed_now();
        let err = QuizSummary::from_persisted(
            Uuid::new_v4(),
            UserId::new("ana"),
            None,
            now,
            now,
            2,
            5,
            0,
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SummaryError::CountMismatch {
                total: 2,
                correct: 5
            }
        ));
    }

    #[test]
    fn empty_run_scores_zero() {
        let now = fixed_now();
        let summary =
            QuizSummary::from_answers(UserId::new("ana"), None, now, now, &[]).unwrap();
        assert_eq!(summary.score_percent(), 0);
    }
}
