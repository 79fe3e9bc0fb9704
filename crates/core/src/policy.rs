//! Pure access policy gate.
//!
//! `check` consumes a resolved [`EntitlementState`] plus a requested
//! action and returns an allow/deny decision with a reason code. It
//! performs no I/O and has no side effects, so callers may invoke it
//! speculatively (e.g. to gray out a start button) and unit tests run
//! against literal fixtures.

use chrono::{DateTime, Utc};

use crate::model::{EntitlementState, ExamId, PlanLimits, PlanTier, QuotaRemaining};

//
// ─── ACTIONS ───────────────────────────────────────────────────────────────────
//

/// What the user is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    StartSession,
    AdvanceQuestion,
    ViewExplanation,
}

/// A requested action, optionally targeting one exam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    pub exam: Option<ExamId>,
}

impl Action {
    #[must_use]
    pub fn start_session(exam: Option<ExamId>) -> Self {
        Self {
            kind: ActionKind::StartSession,
            exam,
        }
    }

    #[must_use]
    pub fn advance_question(exam: Option<ExamId>) -> Self {
        Self {
            kind: ActionKind::AdvanceQuestion,
            exam,
        }
    }

    #[must_use]
    pub fn view_explanation() -> Self {
        Self {
            kind: ActionKind::ViewExplanation,
            exam: None,
        }
    }
}

//
// ─── DECISION ──────────────────────────────────────────────────────────────────
//

/// Why a check passed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReasonCode {
    Ok,
    Suspended,
    TrialExpired,
    ExamNotGranted,
    QuotaExhausted,
    PlanRestricted,
}

/// Outcome of one policy check.
///
/// Denials are expected, user-facing data, never errors. When denied,
/// `required_tier` carries the minimal upgrade that would satisfy the
/// request (upsell signal), or `None` when no upgrade helps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    allowed: bool,
    reason: ReasonCode,
    required_tier: Option<PlanTier>,
}

impl AccessDecision {
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: ReasonCode::Ok,
            required_tier: None,
        }
    }

    #[must_use]
    pub fn deny(reason: ReasonCode, required_tier: Option<PlanTier>) -> Self {
        Self {
            allowed: false,
            reason,
            required_tier,
        }
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    #[must_use]
    pub fn reason(&self) -> ReasonCode {
        self.reason
    }

    #[must_use]
    pub fn required_tier(&self) -> Option<PlanTier> {
        self.required_tier
    }
}

//
// ─── GATE ──────────────────────────────────────────────────────────────────────
//

/// Decides whether `action` is permitted under `entitlement`.
///
/// First matching rule wins; the ordering matters: a suspended account
/// must be denied even when its quota would pass, and a plus account is
/// never denied by the later rules at all.
#[must_use]
pub fn check(
    entitlement: &EntitlementState,
    action: &Action,
    limits: &PlanLimits,
    now: DateTime<Utc>,
) -> AccessDecision {
    // 1. Suspended or deleted accounts are blocked outright.
    if entitlement.status().is_blocked() {
        return AccessDecision::deny(ReasonCode::Suspended, None);
    }

    let effective = entitlement.effective_tier(limits, now);
    let consumes = matches!(
        action.kind,
        ActionKind::StartSession | ActionKind::AdvanceQuestion
    );

    // 2. A lapsed trial cannot start or continue a session.
    if consumes
        && entitlement.tier() == PlanTier::Trial
        && entitlement.trial_days_remaining(limits, now) == 0
    {
        return AccessDecision::deny(ReasonCode::TrialExpired, Some(PlanTier::Individual));
    }

    // 3. Exam-restricted tiers need the target exam granted and unexpired.
    if let Some(exam) = &action.exam {
        if entitlement.restricts_exams() && !entitlement.has_exam_access(exam, now) {
            return AccessDecision::deny(ReasonCode::ExamNotGranted, Some(PlanTier::Plus));
        }
    }

    // 4. Advancing consumes one quota unit; a dry cap blocks it.
    if action.kind == ActionKind::AdvanceQuestion
        && !entitlement.quota_remaining(limits, now).is_available()
    {
        return AccessDecision::deny(ReasonCode::QuotaExhausted, Some(PlanTier::Individual));
    }

    // 5. Explanations are closed to the free tier.
    if action.kind == ActionKind::ViewExplanation && !effective.has_explanations() {
        return AccessDecision::deny(ReasonCode::PlanRestricted, Some(PlanTier::Plus));
    }

    AccessDecision::allow()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
