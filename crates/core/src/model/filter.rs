use serde::{Deserialize, Serialize};

use crate::model::ids::ExamId;
use crate::model::question::Question;

/// Criteria that select a session's working set.
///
/// Stored inside every snapshot so a resumed session re-checks the exact
/// criteria it was started with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionFilter {
    pub exam: Option<ExamId>,
    pub subject: Option<String>,
    pub module: Option<String>,
    pub year: Option<i32>,
}

impl QuestionFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_exam(mut self, exam: ExamId) -> Self {
        self.exam = Some(exam);
        self
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
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

    /// True when no criterion is set (the whole pool matches).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exam.is_none() && self.subject.is_none() && self.module.is_none() && self.year.is_none()
    }

    /// True when the question satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, question: &Question) -> bool {
        if let Some(exam) = &self.exam {
            if question.exam() != Some(exam) {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if question.subject() != Some(subject.as_str()) {
                return false;
            }
        }
        if let Some(module) = &self.module {
            if question.module() != Some(module.as_str()) {
                return false;
            }
        }
        if let Some(year) = self.year {
            if question.year() != Some(year) {
                return false;
            }
        }
        true
    }
}
