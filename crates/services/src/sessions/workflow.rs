use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use quiz_core::Clock;
use quiz_core::model::{AnswerRecord, PlanLimits, QuestionFilter, UserId};
use quiz_core::policy::{self, AccessDecision, Action};
use storage::repository::{
    EntitlementStore, ProgressStore, QuestionRepository, StorageError, SummaryRepository,
};

use super::countdown::{CountdownFired, QuestionCountdown};
use super::machine::{AdvanceOutcome, QuizPhase, QuizSession};
use super::plan::WorkingSetBuilder;
use crate::entitlement::EntitlementResolver;
use crate::error::SessionError;
use crate::progress_service::ProgressService;

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Result of trying to start a session.
#[derive(Debug)]
pub enum SessionStart {
    Started(QuizSession),
    Denied(AccessDecision),
}

/// Result of trying to resume a saved session.
#[derive(Debug)]
pub enum SessionResume {
    Resumed(QuizSession),
    Denied(AccessDecision),
    /// No snapshot, or one that was corrupt/stale and has been discarded.
    Absent,
}

/// Result of an advance, including an early finish forced by policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceResult {
    pub outcome: AdvanceOutcome,
    /// Set when a policy denial ended the session early.
    pub denial: Option<AccessDecision>,
    pub summary_id: Option<Uuid>,
}

/// Explanation text for the current question, gated by plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplanationAccess {
    Granted(Option<String>),
    Denied(AccessDecision),
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Orchestrates session start, answering, persistence and resume.
///
/// Every user action is checked against the access policy gate before the
/// state machine moves; denials come back as data. Checkpointing happens
/// only on explicit save-and-exit; the in-memory session is the source
/// of truth during a run.
#[derive(Clone)]
pub struct QuizLoopService {
    clock: Clock,
    resolver: EntitlementResolver,
    questions: Arc<dyn QuestionRepository>,
    progress: ProgressService,
    summaries: Arc<dyn SummaryRepository>,
    shuffle: bool,
    max_questions: Option<usize>,
}

impl QuizLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        limits: PlanLimits,
        questions: Arc<dyn QuestionRepository>,
        entitlements: Arc<dyn EntitlementStore>,
        progress: Arc<dyn ProgressStore>,
        summaries: Arc<dyn SummaryRepository>,
    ) -> Self {
        Self {
            clock,
            resolver: EntitlementResolver::new(entitlements, limits, clock),
            questions,
            progress: ProgressService::new(progress),
            summaries,
            shuffle: false,
            max_questions: None,
        }
    }

    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    #[must_use]
    pub fn with_max_questions(mut self, max_questions: usize) -> Self {
        self.max_questions = Some(max_questions);
        self
    }

    #[must_use]
    pub fn resolver(&self) -> &EntitlementResolver {
        &self.resolver
    }

    /// Per-question countdown budget.
    #[must_use]
    pub fn question_budget(&self) -> Duration {
        Duration::from_secs(u64::from(
            self.resolver.limits().question_time_budget_secs(),
        ))
    }

    /// Start a new session for the user over the filtered question pool.
    ///
    /// A policy denial is returned as data. Starting discards any saved
    /// snapshot: one active session per user, never stacked.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` when no questions survive selection,
    /// or storage errors from the repositories.
    pub async fn start_session(
        &self,
        user: &UserId,
        filter: QuestionFilter,
    ) -> Result<SessionStart, SessionError> {
        let now = self.clock.now();
        let entitlement = self.resolver.resolve(user).await;
        let decision = policy::check(
            &entitlement,
            &Action::start_session(filter.exam.clone()),
            self.resolver.limits(),
            now,
        );
        if !decision.is_allowed() {
            return Ok(SessionStart::Denied(decision));
        }

        let pool = self.questions.working_set(&filter).await?;
        let tier = entitlement.effective_tier(self.resolver.limits(), now);
        let mut builder = WorkingSetBuilder::new(tier).with_shuffle(self.shuffle);
        if let Some(limit) = self.max_questions {
            builder = builder.with_limit(limit);
        }
        let set = builder.build(pool);
        if set.is_empty() {
            return Err(SessionError::Empty);
        }
        if set.tier_filtered > 0 {
            tracing::debug!(
                user = %user,
                dropped = set.tier_filtered,
                "tier-restricted questions excluded from working set"
            );
        }

        self.progress.clear(user).await?;

        let session = QuizSession::new(
            user.clone(),
            filter,
            set.questions,
            self.resolver.limits().question_time_budget_secs(),
            now,
        )?;
        Ok(SessionStart::Started(session))
    }

    /// Resume the user's saved session, if one exists and is still
    /// permitted.
    ///
    /// The gate is re-checked against current entitlement: a session
    /// saved under filters the user may no longer access (e.g. a revoked
    /// exam) is denied rather than silently honored. The snapshot is kept
    /// on a denial so a re-grant makes it resumable again; a snapshot
    /// whose questions no longer exist is discarded as corrupt.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the repositories.
    pub async fn resume_session(&self, user: &UserId) -> Result<SessionResume, SessionError> {
        let Some(snapshot) = self.progress.load(user).await? else {
            return Ok(SessionResume::Absent);
        };

        let now = self.clock.now();
        let entitlement = self.resolver.resolve(user).await;
        let decision = policy::check(
            &entitlement,
            &Action::start_session(snapshot.filter().exam.clone()),
            self.resolver.limits(),
            now,
        );
        if !decision.is_allowed() {
            return Ok(SessionResume::Denied(decision));
        }

        let questions = match self.questions.questions_by_ids(snapshot.question_ids()).await {
            Ok(questions) => questions,
            Err(StorageError::NotFound) => {
                tracing::warn!(user = %user, "saved session references missing questions, discarding");
                self.progress.clear(user).await?;
                return Ok(SessionResume::Absent);
            }
            Err(err) => return Err(err.into()),
        };

        let budget = self.resolver.limits().question_time_budget_secs();
        match QuizSession::resume(user.clone(), snapshot, questions, budget, now) {
            Ok(session) => Ok(SessionResume::Resumed(session)),
            Err(SessionError::Finished) => {
                self.progress.clear(user).await?;
                Ok(SessionResume::Absent)
            }
            Err(err) => Err(err),
        }
    }

    /// Arm the countdown for the session's current question, replacing
    /// any pending one.
    pub fn arm_countdown(
        &self,
        countdown: &mut QuestionCountdown,
        session: &QuizSession,
        events: UnboundedSender<CountdownFired>,
    ) {
        countdown.arm(session.current_index(), self.question_budget(), events);
    }

    /// Confirm the selected option, revealing and charging quota.
    ///
    /// Quota is charged on reveal, not on selection, so abandoning a
    /// question before confirming never costs anything. The caller must
    /// cancel the pending countdown alongside this call.
    ///
    /// # Errors
    ///
    /// Propagates the machine's transition errors.
    pub async fn confirm_answer(
        &self,
        session: &mut QuizSession,
    ) -> Result<AnswerRecord, SessionError> {
        let now = self.clock.now();
        let record = session.confirm(now)?.clone();
        let entitlement = self.resolver.resolve(session.user_id()).await;
        self.resolver.consume_quota(&entitlement).await;
        Ok(record)
    }

    /// Handle a countdown expiry event.
    ///
    /// A stale event (for a question the session has already moved past,
    /// or one that lost the race against a confirm) returns `None`.
    pub async fn timer_expired(
        &self,
        session: &mut QuizSession,
        fired: CountdownFired,
    ) -> Result<Option<AnswerRecord>, SessionError> {
        if session.is_finished() || fired.question_index != session.current_index() {
            return Ok(None);
        }
        let now = self.clock.now();
        let Some(record) = session.timer_expire(now).cloned() else {
            return Ok(None);
        };
        let entitlement = self.resolver.resolve(session.user_id()).await;
        self.resolver.consume_quota(&entitlement).await;
        Ok(Some(record))
    }

    /// Advance past the revealed question, re-checking the gate first.
    ///
    /// A denial discovered here (typically an exhausted quota) finishes
    /// the session early (already-answered questions keep their score)
    /// rather than blocking. Reaching the end persists the run summary.
    ///
    /// # Errors
    ///
    /// Returns the machine's transition errors, or storage errors from
    /// the summary append (retryable via [`Self::finalize_summary`]).
    pub async fn advance(&self, session: &mut QuizSession) -> Result<AdvanceResult, SessionError> {
        if session.is_finished() {
            return Err(SessionError::Finished);
        }
        if session.phase() != QuizPhase::Revealed {
            return Err(SessionError::NotRevealed);
        }

        let now = self.clock.now();
        let entitlement = self.resolver.resolve(session.user_id()).await;
        let decision = policy::check(
            &entitlement,
            &Action::advance_question(session.filter().exam.clone()),
            self.resolver.limits(),
            now,
        );

        if !decision.is_allowed() {
            session.finish_early(now)?;
            let summary_id = self.persist_summary(session).await?;
            return Ok(AdvanceResult {
                outcome: AdvanceOutcome::Finished,
                denial: Some(decision),
                summary_id: Some(summary_id),
            });
        }

        let outcome = session.advance(now)?;
        let summary_id = match outcome {
            AdvanceOutcome::Finished => Some(self.persist_summary(session).await?),
            AdvanceOutcome::Next => None,
        };

        Ok(AdvanceResult {
            outcome,
            denial: None,
            summary_id,
        })
    }

    /// Explanation for the current (revealed) question, plan permitting.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotRevealed` before the reveal.
    pub async fn view_explanation(
        &self,
        session: &QuizSession,
    ) -> Result<ExplanationAccess, SessionError> {
        if session.phase() != QuizPhase::Revealed {
            return Err(SessionError::NotRevealed);
        }
        let now = self.clock.now();
        let entitlement = self.resolver.resolve(session.user_id()).await;
        let decision = policy::check(
            &entitlement,
            &Action::view_explanation(),
            self.resolver.limits(),
            now,
        );
        if !decision.is_allowed() {
            return Ok(ExplanationAccess::Denied(decision));
        }
        let explanation = session
            .current_question()
            .and_then(|q| q.explanation())
            .map(str::to_owned);
        Ok(ExplanationAccess::Granted(explanation))
    }

    /// Leave the session, checkpointing only when `save` is true.
    ///
    /// Persistence exists for pause/resume, not crash recovery: nothing
    /// is written during a run, and discarding clears any prior snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Finished` when saving a finished session,
    /// or storage errors from the progress store.
    pub async fn exit_session(
        &self,
        session: &QuizSession,
        save: bool,
    ) -> Result<(), SessionError> {
        if save {
            let snapshot = session.snapshot(self.clock.now())?;
            self.progress.save(session.user_id(), &snapshot).await?;
        } else {
            self.progress.clear(session.user_id()).await?;
        }
        Ok(())
    }

    /// Retry summary persistence after a completed session.
    ///
    /// Useful when the final append failed on a transient storage error.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Finished` if the session is not complete,
    /// or `SessionError::Storage` if persistence fails again.
    pub async fn finalize_summary(&self, session: &mut QuizSession) -> Result<Uuid, SessionError> {
        if let Some(id) = session.summary_id() {
            return Ok(id);
        }
        if !session.is_finished() {
            return Err(SessionError::Finished);
        }
        self.persist_summary(session).await
    }

    async fn persist_summary(&self, session: &mut QuizSession) -> Result<Uuid, SessionError> {
        if let Some(id) = session.summary_id() {
            return Ok(id);
        }
        let completed_at = session.finished_at().ok_or(SessionError::Finished)?;
        let summary = session.build_summary(completed_at)?;
        self.summaries.append_summary(&summary).await?;
        session.set_summary_id(summary.id());
        // The finished session's snapshot has no further use.
        if let Err(err) = self.progress.clear(session.user_id()).await {
            tracing::warn!(user = %session.user_id(), error = %err, "failed to clear finished session snapshot");
        }
        Ok(summary.id())
    }
}
