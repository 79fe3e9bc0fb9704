use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlanError {
    #[error("daily question cap must be > 0")]
    InvalidDailyCap,

    #[error("trial length must be > 0 days")]
    InvalidTrialDays,

    #[error("question time budget must be between 5 and 600 seconds")]
    InvalidTimeBudget,
}

//
// ─── PLAN TIER ─────────────────────────────────────────────────────────────────
//

/// Subscription tier of a user account.
///
/// Determines the daily question quota and the default exam-access rules:
/// - `Free`: capped questions per day, no explanations
/// - `Trial`: same cap as free, full features for a limited number of days
/// - `Individual`: unlimited questions, locked to one purchased exam
/// - `Plus`: unlimited questions, every exam
///
/// Ordering follows that list, so tier-restriction checks can compare
/// directly (`tier >= min_tier`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Trial,
    Individual,
    Plus,
}

impl PlanTier {
    /// Interprets a raw persisted plan value.
    ///
    /// The record store treats the plan as a loosely-typed string; this is
    /// the single place those values are resolved. Unset or unrecognized
    /// values default to `Free`, which also covers the legacy
    /// `"gratuito"` spelling.
    #[must_use]
    pub fn from_record(raw: Option<&str>) -> Self {
        match raw {
            Some("trial") => Self::Trial,
            Some("individual") => Self::Individual,
            Some("plus") => Self::Plus,
            _ => Self::Free,
        }
    }

    /// Canonical string form used by the record store.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Trial => "trial",
            Self::Individual => "individual",
            Self::Plus => "plus",
        }
    }

    /// True for tiers whose daily question count is capped.
    #[must_use]
    pub fn is_capped(self) -> bool {
        matches!(self, Self::Free | Self::Trial)
    }

    /// True for tiers that may read question explanations.
    #[must_use]
    pub fn has_explanations(self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── QUOTA ─────────────────────────────────────────────────────────────────────
//

/// How many questions a user may still answer today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaRemaining {
    Limited(u32),
    Unbounded,
}

impl QuotaRemaining {
    /// True when at least one more question may be answered.
    #[must_use]
    pub fn is_available(self) -> bool {
        match self {
            Self::Limited(n) => n > 0,
            Self::Unbounded => true,
        }
    }
}

//
// ─── LIMITS ────────────────────────────────────────────────────────────────────
//

/// Tunable limits shared by every policy check.
///
/// Free and trial accounts share one daily question cap; individual and
/// plus are unbounded. The per-question time budget drives the countdown
/// and the forced auto-submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLimits {
    daily_question_cap: u32,
    trial_days: i64,
    question_time_budget_secs: u32,
}

impl PlanLimits {
    /// Creates custom limits.
    ///
    /// # Errors
    ///
    /// Returns `PlanError` if the cap or trial length is zero, or the time
    /// budget falls outside 5–600 seconds.
    pub fn new(
        daily_question_cap: u32,
        trial_days: i64,
        question_time_budget_secs: u32,
    ) -> Result<Self, PlanError> {
        if daily_question_cap == 0 {
            return Err(PlanError::InvalidDailyCap);
        }
        if trial_days <= 0 {
            return Err(PlanError::InvalidTrialDays);
        }
        if !(5..=600).contains(&question_time_budget_secs) {
            return Err(PlanError::InvalidTimeBudget);
        }

        Ok(Self {
            daily_question_cap,
            trial_days,
            question_time_budget_secs,
        })
    }

    #[must_use]
    pub fn daily_question_cap(&self) -> u32 {
        self.daily_question_cap
    }

    #[must_use]
    pub fn trial_days(&self) -> i64 {
        self.trial_days
    }

    #[must_use]
    pub fn question_time_budget_secs(&self) -> u32 {
        self.question_time_budget_secs
    }

    /// Daily cap for the given tier, `None` when unbounded.
    #[must_use]
    pub fn daily_cap(&self, tier: PlanTier) -> Option<u32> {
        tier.is_capped().then_some(self.daily_question_cap)
    }
}

impl Default for PlanLimits {
    /// 50 questions per day on capped tiers, 30 trial days, 30 seconds per
    /// question.
    fn default() -> Self {
        Self {
            daily_question_cap: 50,
            trial_days: 30,
            question_time_budget_secs: 30,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
