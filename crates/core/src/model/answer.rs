use serde::{Deserialize, Serialize};

use crate::model::ids::QuestionId;
use crate::model::question::Question;

//
// ─── SELECTION ─────────────────────────────────────────────────────────────────
//

/// What the user picked for a question, or the timeout sentinel.
///
/// `TimeExpired` records a question whose countdown fired before any
/// option was confirmed; it is never correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    Chosen(u8),
    TimeExpired,
}

impl Selection {
    /// Chosen option index, `None` for the timeout sentinel.
    #[must_use]
    pub fn index(self) -> Option<u8> {
        match self {
            Self::Chosen(i) => Some(i),
            Self::TimeExpired => None,
        }
    }

    #[must_use]
    pub fn is_time_expired(self) -> bool {
        matches!(self, Self::TimeExpired)
    }
}

//
// ─── ANSWER RECORD ─────────────────────────────────────────────────────────────
//

/// Record of a single revealed answer within a session.
///
/// Correctness is derived at record time and the subject tag is copied
/// from the question, so later aggregation survives question re-tagging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub selection: Selection,
    pub correct: bool,
    pub time_spent_secs: u32,
    pub subject: Option<String>,
}

impl AnswerRecord {
    /// Builds the record for a revealed question.
    ///
    /// Time spent is clamped to the per-question budget; a `TimeExpired`
    /// selection is incorrect by definition.
    #[must_use]
    pub fn record(
        question: &Question,
        selection: Selection,
        time_spent_secs: u32,
        budget_secs: u32,
    ) -> Self {
        let correct = match selection {
            Selection::Chosen(i) => question.is_correct(i),
            Selection::TimeExpired => false,
        };

        Self {
            question_id: question.id(),
            selection,
            correct,
            time_spent_secs: time_spent_secs.min(budget_secs),
            subject: question.subject().map(str::to_owned),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
