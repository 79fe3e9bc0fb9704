use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::answer::AnswerRecord;
use crate::model::filter::QuestionFilter;
use crate::model::ids::QuestionId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("current index {current} exceeds working set length {len}")]
    IndexOutOfRange { current: usize, len: usize },

    #[error("answer count {answers} does not match current index {current}")]
    AnswerCountMismatch { answers: usize, current: usize },
}

/// Persisted form of a paused session.
///
/// Holds the frozen working set, the position inside it, everything
/// answered so far and the filter the set was built from. Invariants:
/// `current <= question_ids.len()` and one answer per passed question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    question_ids: Vec<QuestionId>,
    current: usize,
    answers: Vec<AnswerRecord>,
    filter: QuestionFilter,
    saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Builds a snapshot, enforcing the rest-point invariants.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the index exceeds the working set or the
    /// answer count does not equal the index.
    pub fn new(
        question_ids: Vec<QuestionId>,
        current: usize,
        answers: Vec<AnswerRecord>,
        filter: QuestionFilter,
        saved_at: DateTime<Utc>,
    ) -> Result<Self, SnapshotError> {
        let snapshot = Self {
            question_ids,
            current,
            answers,
            filter,
            saved_at,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Re-checks the invariants, e.g. after deserializing a stored blob.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` when the record is structurally invalid;
    /// the progress adapter treats that as a corrupt (absent) snapshot.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.current > self.question_ids.len() {
            return Err(SnapshotError::IndexOutOfRange {
                current: self.current,
                len: self.question_ids.len(),
            });
        }
        if self.answers.len() != self.current {
            return Err(SnapshotError::AnswerCountMismatch {
                answers: self.answers.len(),
                current: self.current,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn question_ids(&self) -> &[QuestionId] {
        &self.question_ids
    }

    #[must_use]
    pub fn current(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    #[must_use]
    pub fn filter(&self) -> &QuestionFilter {
        &self.filter
    }

    #[must_use]
    pub fn saved_at(&self) -> DateTime<Utc> {
        self.saved_at
    }

    /// True when every question in the working set has been answered.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.current >= self.question_ids.len()
    }

    /// Consumes the snapshot into its parts for session rebuilding.
    #[must_use]
    pub fn into_parts(self) -> (Vec<QuestionId>, usize, Vec<AnswerRecord>, QuestionFilter) {
        (self.question_ids, self.current, self.answers, self.filter)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
