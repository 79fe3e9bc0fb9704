use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use quiz_core::model::{
    AnswerRecord, OPTION_COUNT, Question, QuestionFilter, QuizSummary, Selection, SessionSnapshot,
    UserId,
};

use super::progress::SessionProgress;
use crate::error::SessionError;

//
// ─── PHASES ────────────────────────────────────────────────────────────────────
//

/// Where the current question stands.
///
/// `Selected` is reversible (the two-step choose-then-confirm design);
/// `Revealed` is immutable for this question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizPhase {
    Presenting,
    Selected(u8),
    Revealed,
}

/// What `advance` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Next,
    Finished,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// In-memory quiz run over a frozen working set.
///
/// Steps through the questions sequentially: select, confirm (or time
/// out), reveal, advance. One answer record is appended per reveal and
/// never rewritten. Invalid transitions return errors; they indicate a
/// controller bug, not a user condition.
pub struct QuizSession {
    user_id: UserId,
    filter: QuestionFilter,
    questions: Vec<Question>,
    current: usize,
    phase: QuizPhase,
    answers: Vec<AnswerRecord>,
    budget_secs: u32,
    started_at: DateTime<Utc>,
    question_started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    summary_id: Option<Uuid>,
}

impl QuizSession {
    /// Create a new session over a non-empty working set.
    ///
    /// `started_at` should come from the services layer clock to keep
    /// time deterministic.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` if no questions are provided.
    pub fn new(
        user_id: UserId,
        filter: QuestionFilter,
        questions: Vec<Question>,
        budget_secs: u32,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if questions.is_empty() {
            return Err(SessionError::Empty);
        }

        Ok(Self {
            user_id,
            filter,
            questions,
            current: 0,
            phase: QuizPhase::Presenting,
            answers: Vec::new(),
            budget_secs,
            started_at,
            question_started_at: started_at,
            finished_at: None,
            summary_id: None,
        })
    }

    /// Rebuild a session from a saved snapshot and its refetched working
    /// set.
    ///
    /// The questions must be the snapshot's frozen set, in order. The
    /// session resumes at the saved index in `Presenting` phase with a
    /// fresh question clock.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::WorkingSetMismatch` if the questions do not
    /// match the snapshot ids, or `SessionError::Finished` if the
    /// snapshot has no question left to present.
    pub fn resume(
        user_id: UserId,
        snapshot: SessionSnapshot,
        questions: Vec<Question>,
        budget_secs: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if snapshot.is_exhausted() {
            return Err(SessionError::Finished);
        }
        let ids_match = questions.len() == snapshot.question_ids().len()
            && questions
                .iter()
                .zip(snapshot.question_ids())
                .all(|(q, id)| q.id() == *id);
        if !ids_match {
            return Err(SessionError::WorkingSetMismatch);
        }

        let (_, current, answers, filter) = snapshot.into_parts();

        Ok(Self {
            user_id,
            filter,
            questions,
            current,
            phase: QuizPhase::Presenting,
            answers,
            budget_secs,
            started_at: now,
            question_started_at: now,
            finished_at: None,
            summary_id: None,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn filter(&self) -> &QuestionFilter {
        &self.filter
    }

    #[must_use]
    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn budget_secs(&self) -> u32 {
        self.budget_secs
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    #[must_use]
    pub fn summary_id(&self) -> Option<Uuid> {
        self.summary_id
    }

    #[must_use]
    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    /// Total number of questions in this session.
    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    /// Number of questions that have already been revealed.
    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    /// Number of questions not yet presented or still unrevealed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.questions.len().saturating_sub(self.current)
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        if self.finished_at.is_none() && self.current < self.questions.len() {
            Some(&self.questions[self.current])
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Returns a summary of the current session progress.
    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            total: self.total_questions(),
            answered: self.answered_count(),
            remaining: self.remaining(),
            is_finished: self.is_finished(),
        }
    }

    /// Choose (or change) an option for the current question.
    ///
    /// Choosing after the reveal is a silent no-op (double-clicks must
    /// not surface errors). Nothing is recorded or charged here.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Finished` after the session ended, or
    /// `SessionError::InvalidOption` for an out-of-range index.
    pub fn select_option(&mut self, option: u8) -> Result<(), SessionError> {
        if self.is_finished() {
            return Err(SessionError::Finished);
        }
        if usize::from(option) >= OPTION_COUNT {
            return Err(SessionError::InvalidOption(option));
        }
        match self.phase {
            QuizPhase::Presenting | QuizPhase::Selected(_) => {
                self.phase = QuizPhase::Selected(option);
            }
            QuizPhase::Revealed => {}
        }
        Ok(())
    }

    /// Commit the selected option, revealing and recording the answer.
    ///
    /// The caller must cancel the pending countdown alongside this call.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoSelection` when nothing is chosen,
    /// `SessionError::AlreadyRevealed` after the reveal, or
    /// `SessionError::Finished` after the session ended.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<&AnswerRecord, SessionError> {
        if self.is_finished() {
            return Err(SessionError::Finished);
        }
        match self.phase {
            QuizPhase::Presenting => Err(SessionError::NoSelection),
            QuizPhase::Revealed => Err(SessionError::AlreadyRevealed),
            QuizPhase::Selected(option) => Ok(self.reveal(Selection::Chosen(option), now)),
        }
    }

    /// Countdown expiry for the current question.
    ///
    /// A pending unconfirmed choice is committed as-is; with nothing
    /// chosen the time-expired sentinel is recorded (incorrect by
    /// definition). Firing after the reveal, i.e. losing the race
    /// against a near-simultaneous confirm, is a guaranteed no-op and
    /// returns `None`.
    pub fn timer_expire(&mut self, now: DateTime<Utc>) -> Option<&AnswerRecord> {
        if self.is_finished() {
            return None;
        }
        match self.phase {
            QuizPhase::Revealed => None,
            QuizPhase::Presenting => Some(self.reveal(Selection::TimeExpired, now)),
            QuizPhase::Selected(option) => Some(self.reveal(Selection::Chosen(option), now)),
        }
    }

    fn reveal(&mut self, selection: Selection, now: DateTime<Utc>) -> &AnswerRecord {
        let elapsed = (now - self.question_started_at).num_seconds().max(0);
        let time_spent = u32::try_from(elapsed).unwrap_or(u32::MAX);
        let record = AnswerRecord::record(
            &self.questions[self.current],
            selection,
            time_spent,
            self.budget_secs,
        );
        self.answers.push(record);
        self.phase = QuizPhase::Revealed;
        self.answers.last().expect("answer just pushed")
    }

    /// Move to the next question, or finish after the last one.
    ///
    /// Resets the question clock; the caller re-arms the countdown.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotRevealed` before the reveal, or
    /// `SessionError::Finished` after the session ended.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<AdvanceOutcome, SessionError> {
        if self.is_finished() {
            return Err(SessionError::Finished);
        }
        if self.phase != QuizPhase::Revealed {
            return Err(SessionError::NotRevealed);
        }

        if self.current + 1 < self.questions.len() {
            self.current += 1;
            self.phase = QuizPhase::Presenting;
            self.question_started_at = now;
            Ok(AdvanceOutcome::Next)
        } else {
            self.finished_at = Some(now);
            Ok(AdvanceOutcome::Finished)
        }
    }

    /// End the session now, keeping every answer already scored.
    ///
    /// Used when a policy denial (e.g. exhausted quota) is discovered on
    /// advance: the run finishes early instead of blocking.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Finished` if already finished.
    pub fn finish_early(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.is_finished() {
            return Err(SessionError::Finished);
        }
        self.finished_at = Some(now);
        Ok(())
    }

    /// Snapshot the session at its enclosing rest point.
    ///
    /// A revealed answer is committed (the snapshot resumes at the next
    /// question); an unconfirmed selection is dropped (the question is
    /// re-presented with a fresh timer on resume).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Finished` after the session ended, or a
    /// snapshot invariant error (which would indicate a machine bug).
    pub fn snapshot(&self, saved_at: DateTime<Utc>) -> Result<SessionSnapshot, SessionError> {
        if self.is_finished() {
            return Err(SessionError::Finished);
        }
        let rest_index = match self.phase {
            QuizPhase::Revealed => self.current + 1,
            QuizPhase::Presenting | QuizPhase::Selected(_) => self.current,
        };
        Ok(SessionSnapshot::new(
            self.questions.iter().map(Question::id).collect(),
            rest_index,
            self.answers.clone(),
            self.filter.clone(),
            saved_at,
        )?)
    }

    pub(crate) fn build_summary(
        &self,
        completed_at: DateTime<Utc>,
    ) -> Result<QuizSummary, SessionError> {
        Ok(QuizSummary::from_answers(
            self.user_id.clone(),
            self.filter.exam.clone(),
            self.started_at,
            completed_at,
            &self.answers,
        )?)
    }

    pub(crate) fn set_summary_id(&mut self, id: Uuid) {
        self.summary_id = Some(id);
    }
}

impl fmt::Debug for QuizSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizSession")
            .field("user_id", &self.user_id)
            .field("questions_len", &self.questions.len())
            .field("current", &self.current)
            .field("phase", &self.phase)
            .field("answers_len", &self.answers.len())
            .field("started_at", &self.started_at)
            .field("finished_at", &self.finished_at)
            .field("summary_id", &self.summary_id)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::QuestionId;
    use quiz_core::time::fixed_now;
    use chrono::Duration;

    fn build_question(id: u64) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Q{id}"),
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            1,
        )
        .unwrap()
        .with_subject("Português")
    }

    fn build_session(n: u64) -> QuizSession {
        let questions = (1..=n).map(build_question).collect();
        QuizSession::new(
            UserId::new("ana"),
            QuestionFilter::new(),
            questions,
            30,
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn empty_working_set_is_rejected() {
        let err = QuizSession::new(
            UserId::new("ana"),
            QuestionFilter::new(),
            Vec::new(),
            30,
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Empty));
    }

    #[test]
    fn full_run_answers_every_question_exactly_once() {
        let mut session = build_session(5);
        let now = fixed_now();

        for i in 0..5 {
            assert_eq!(session.current_index(), i);
            session.select_option(1).unwrap();
            let record = session.confirm(now).unwrap();
            assert!(record.correct);
            let outcome = session.advance(now).unwrap();
            if i < 4 {
                assert_eq!(outcome, AdvanceOutcome::Next);
            } else {
                assert_eq!(outcome, AdvanceOutcome::Finished);
            }
        }

        assert!(session.is_finished());
        assert_eq!(session.answers().len(), 5);
        assert!(matches!(session.advance(now), Err(SessionError::Finished)));
    }

    #[test]
    fn advance_without_reveal_is_rejected() {
        let mut session = build_session(2);
        let now = fixed_now();

        session.select_option(0).unwrap();
        let err = session.advance(now).unwrap_err();
        assert!(matches!(err, SessionError::NotRevealed));
        // Nothing was recorded and the selection is still pending.
        assert_eq!(session.answers().len(), 0);
        assert_eq!(session.phase(), QuizPhase::Selected(0));
    }

    #[test]
    fn confirm_without_selection_is_rejected() {
        let mut session = build_session(2);
        let err = session.confirm(fixed_now()).unwrap_err();
        assert!(matches!(err, SessionError::NoSelection));
        assert_eq!(session.answers().len(), 0);
    }

    #[test]
    fn selection_is_reversible_until_confirmed() {
        let mut session = build_session(1);
        session.select_option(0).unwrap();
        session.select_option(3).unwrap();
        assert_eq!(session.phase(), QuizPhase::Selected(3));

        let record = session.confirm(fixed_now()).unwrap();
        assert_eq!(record.selection, Selection::Chosen(3));
    }

    #[test]
    fn selecting_after_reveal_is_a_silent_no_op() {
        let mut session = build_session(1);
        session.select_option(1).unwrap();
        session.confirm(fixed_now()).unwrap();

        session.select_option(2).unwrap();
        assert_eq!(session.phase(), QuizPhase::Revealed);
        assert_eq!(session.answers()[0].selection, Selection::Chosen(1));
    }

    #[test]
    fn out_of_range_option_is_rejected() {
        let mut session = build_session(1);
        let err = session.select_option(4).unwrap_err();
        assert!(matches!(err, SessionError::InvalidOption(4)));
    }

    #[test]
    fn timer_expiry_without_selection_records_the_sentinel() {
        let mut session = build_session(1);
        let fired_at = fixed_now() + Duration::seconds(30);

        let record = session.timer_expire(fired_at).unwrap();
        assert_eq!(record.selection, Selection::TimeExpired);
        assert!(!record.correct);
        assert_eq!(record.time_spent_secs, 30);
        assert_eq!(session.phase(), QuizPhase::Revealed);
    }

    #[test]
    fn timer_expiry_commits_a_pending_selection() {
        let mut session = build_session(1);
        session.select_option(1).unwrap();

        let record = session.timer_expire(fixed_now() + Duration::seconds(30)).unwrap();
        assert_eq!(record.selection, Selection::Chosen(1));
        assert!(record.correct);
    }

    #[test]
    fn timer_expiry_after_confirm_is_a_no_op() {
        let mut session = build_session(2);
        session.select_option(1).unwrap();
        session.confirm(fixed_now()).unwrap();

        assert!(session.timer_expire(fixed_now()).is_none());
        assert_eq!(session.answers().len(), 1);
    }

    #[test]
    fn time_spent_is_clamped_to_the_budget() {
        let mut session = build_session(1);
        session.select_option(1).unwrap();
        let record = session.confirm(fixed_now() + Duration::seconds(90)).unwrap();
        assert_eq!(record.time_spent_secs, 30);
    }

    #[test]
    fn finish_early_keeps_scored_answers() {
        let mut session = build_session(3);
        let now = fixed_now();
        session.select_option(1).unwrap();
        session.confirm(now).unwrap();

        session.finish_early(now).unwrap();
        assert!(session.is_finished());
        assert_eq!(session.answers().len(), 1);
        assert!(matches!(
            session.finish_early(now),
            Err(SessionError::Finished)
        ));
    }

    #[test]
    fn snapshot_mid_question_drops_the_unconfirmed_selection() {
        let mut session = build_session(3);
        let now = fixed_now();
        session.select_option(1).unwrap();
        session.confirm(now).unwrap();
        session.advance(now).unwrap();
        session.select_option(2).unwrap();

        let snap = session.snapshot(now).unwrap();
        assert_eq!(snap.current(), 1);
        assert_eq!(snap.answers().len(), 1);
    }

    #[test]
    fn snapshot_after_reveal_commits_the_answer() {
        let mut session = build_session(3);
        let now = fixed_now();
        session.select_option(1).unwrap();
        session.confirm(now).unwrap();

        let snap = session.snapshot(now).unwrap();
        assert_eq!(snap.current(), 1);
        assert_eq!(snap.answers().len(), 1);
    }

    #[test]
    fn resume_restores_position_and_answers() {
        let mut session = build_session(3);
        let now = fixed_now();
        session.select_option(1).unwrap();
        session.confirm(now).unwrap();
        session.advance(now).unwrap();

        let snap = session.snapshot(now).unwrap();
        let questions: Vec<Question> = (1..=3).map(build_question).collect();
        let resumed =
            QuizSession::resume(UserId::new("ana"), snap.clone(), questions, 30, now).unwrap();

        assert_eq!(resumed.current_index(), snap.current());
        assert_eq!(resumed.answers(), snap.answers());
        assert_eq!(resumed.phase(), QuizPhase::Presenting);
    }

    #[test]
    fn resume_rejects_a_mismatched_working_set() {
        let session = build_session(3);
        let snap = session.snapshot(fixed_now()).unwrap();

        let wrong: Vec<Question> = (4..=6).map(build_question).collect();
        let err =
            QuizSession::resume(UserId::new("ana"), snap, wrong, 30, fixed_now()).unwrap_err();
        assert!(matches!(err, SessionError::WorkingSetMismatch));
    }

    #[test]
    fn summary_reflects_the_run() {
        let mut session = build_session(2);
        let now = fixed_now();
        session.select_option(1).unwrap();
        session.confirm(now).unwrap();
        session.advance(now).unwrap();
        session.select_option(0).unwrap();
        session.confirm(now).unwrap();
        session.advance(now).unwrap();

        let summary = session.build_summary(session.finished_at().unwrap()).unwrap();
        assert_eq!(summary.total_answered(), 2);
        assert_eq!(summary.total_correct(), 1);
    }
}
