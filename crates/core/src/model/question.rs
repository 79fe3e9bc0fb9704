use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ExamId, QuestionId};
use crate::model::plan::PlanTier;

/// Number of answer options every question carries.
pub const OPTION_COUNT: usize = 4;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("expected {OPTION_COUNT} answer options, got {len}")]
    WrongOptionCount { len: usize },

    #[error("answer option {index} cannot be empty")]
    EmptyOption { index: usize },

    #[error("correct option index {index} is out of range 0..{OPTION_COUNT}")]
    CorrectIndexOutOfRange { index: u8 },
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question.
///
/// Authored externally and immutable once a session starts. Exactly four
/// answer options; the subject/exam/module tags drive filtering and the
/// optional minimum tier keeps premium questions out of lower-tier
/// working sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    options: Vec<String>,
    correct: u8,
    explanation: Option<String>,
    subject: Option<String>,
    exam: Option<ExamId>,
    module: Option<String>,
    year: Option<i32>,
    min_tier: Option<PlanTier>,
}

impl Question {
    /// Creates a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt or any option is empty, the
    /// option count is not four, or the correct index is out of range.
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        options: Vec<String>,
        correct: u8,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if options.len() != OPTION_COUNT {
            return Err(QuestionError::WrongOptionCount {
                len: options.len(),
            });
        }
        if let Some(index) = options.iter().position(|o| o.trim().is_empty()) {
            return Err(QuestionError::EmptyOption { index });
        }
        if usize::from(correct) >= OPTION_COUNT {
            return Err(QuestionError::CorrectIndexOutOfRange { index: correct });
        }

        Ok(Self {
            id,
            prompt,
            options,
            correct,
            explanation: None,
            subject: None,
            exam: None,
            module: None,
            year: None,
            min_tier: None,
        })
    }

    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn with_exam(mut self, exam: ExamId) -> Self {
        self.exam = Some(exam);
        self
    }

    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    #[must_use]
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    #[must_use]
    pub fn with_min_tier(mut self, tier: PlanTier) -> Self {
        self.min_tier = Some(tier);
        self
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Index of the correct option (0–3).
    #[must_use]
    pub fn correct(&self) -> u8 {
        self.correct
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    #[must_use]
    pub fn exam(&self) -> Option<&ExamId> {
        self.exam.as_ref()
    }

    #[must_use]
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    #[must_use]
    pub fn year(&self) -> Option<i32> {
        self.year
    }

    #[must_use]
    pub fn min_tier(&self) -> Option<PlanTier> {
        self.min_tier
    }

    /// True when the given option index is the correct answer.
    #[must_use]
    pub fn is_correct(&self, option: u8) -> bool {
        self.correct == option
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
