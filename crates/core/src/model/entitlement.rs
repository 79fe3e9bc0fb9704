use chrono::{DateTime, NaiveDate, Utc};

use crate::model::ids::{ExamId, UserId};
use crate::model::plan::{PlanLimits, PlanTier, QuotaRemaining};

//
// ─── ACCOUNT STATUS ────────────────────────────────────────────────────────────
//

/// Lifecycle status of a user account, set by admin actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Suspended,
    PendingApproval,
    Deleted,
}

impl AccountStatus {
    /// Interprets a raw persisted status value; unset defaults to active.
    #[must_use]
    pub fn from_record(raw: Option<&str>) -> Self {
        match raw {
            Some("suspended") => Self::Suspended,
            Some("pending") => Self::PendingApproval,
            Some("deleted") => Self::Deleted,
            _ => Self::Active,
        }
    }

    /// Canonical string form used by the record store.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::PendingApproval => "pending",
            Self::Deleted => "deleted",
        }
    }

    /// True when the account may not use the platform at all.
    #[must_use]
    pub fn is_blocked(self) -> bool {
        matches!(self, Self::Suspended | Self::Deleted)
    }
}

//
// ─── EXAM GRANT ────────────────────────────────────────────────────────────────
//

/// Explicit permission to access one exam's question set.
///
/// A grant without an expiry is permanent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamGrant {
    pub exam: ExamId,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ExamGrant {
    #[must_use]
    pub fn new(exam: ExamId, granted_at: DateTime<Utc>) -> Self {
        Self {
            exam,
            granted_at,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn expiring(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// True when the grant is still in force at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|exp| now < exp)
    }
}

//
// ─── ENTITLEMENT STATE ─────────────────────────────────────────────────────────
//

/// Resolved entitlement for one user: plan, quota, trial and grants.
///
/// Produced by the entitlement resolver from the raw plan record; all the
/// derived accessors here are pure so the access policy gate can be unit
/// tested against literal states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementState {
    user_id: UserId,
    tier: PlanTier,
    status: AccountStatus,
    trial_started_at: Option<DateTime<Utc>>,
    counted_today: u32,
    counter_date: Option<NaiveDate>,
    original_exam: Option<ExamId>,
    grants: Vec<ExamGrant>,
}

impl EntitlementState {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        user_id: UserId,
        tier: PlanTier,
        status: AccountStatus,
        trial_started_at: Option<DateTime<Utc>>,
        counted_today: u32,
        counter_date: Option<NaiveDate>,
        original_exam: Option<ExamId>,
        grants: Vec<ExamGrant>,
    ) -> Self {
        Self {
            user_id,
            tier,
            status,
            trial_started_at,
            counted_today,
            counter_date,
            original_exam,
            grants,
        }
    }

    /// Safe default for a brand-new or unresolvable user: free tier,
    /// nothing consumed today, no grants.
    #[must_use]
    pub fn default_free(user_id: UserId) -> Self {
        Self::new(
            user_id,
            PlanTier::Free,
            AccountStatus::Active,
            None,
            0,
            None,
            None,
            Vec::new(),
        )
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Plan tier as stored, before trial lapse is applied.
    #[must_use]
    pub fn tier(&self) -> PlanTier {
        self.tier
    }

    #[must_use]
    pub fn status(&self) -> AccountStatus {
        self.status
    }

    #[must_use]
    pub fn trial_started_at(&self) -> Option<DateTime<Utc>> {
        self.trial_started_at
    }

    #[must_use]
    pub fn original_exam(&self) -> Option<&ExamId> {
        self.original_exam.as_ref()
    }

    #[must_use]
    pub fn grants(&self) -> &[ExamGrant] {
        &self.grants
    }

    /// Whole days of trial left, clamped to zero.
    ///
    /// A trial with no recorded start is treated as starting now, i.e.
    /// fully remaining. Non-trial tiers report zero.
    #[must_use]
    pub fn trial_days_remaining(&self, limits: &PlanLimits, now: DateTime<Utc>) -> i64 {
        if self.tier != PlanTier::Trial {
            return 0;
        }
        let Some(started) = self.trial_started_at else {
            return limits.trial_days();
        };
        let elapsed_days = (now - started).num_days();
        (limits.trial_days() - elapsed_days).max(0)
    }

    /// Tier after applying trial lapse: a trial with zero days remaining
    /// behaves as free for every subsequent check.
    #[must_use]
    pub fn effective_tier(&self, limits: &PlanLimits, now: DateTime<Utc>) -> PlanTier {
        if self.tier == PlanTier::Trial && self.trial_days_remaining(limits, now) == 0 {
            PlanTier::Free
        } else {
            self.tier
        }
    }

    /// Questions consumed today, honoring the stored reset-date marker.
    ///
    /// A marker from a previous day reads as zero; nothing is persisted
    /// here; only the explicit consumption call writes the counter.
    #[must_use]
    pub fn counted_today(&self, today: NaiveDate) -> u32 {
        match self.counter_date {
            Some(date) if date == today => self.counted_today,
            _ => 0,
        }
    }

    /// Quota left today for the effective tier.
    #[must_use]
    pub fn quota_remaining(&self, limits: &PlanLimits, now: DateTime<Utc>) -> QuotaRemaining {
        let tier = self.effective_tier(limits, now);
        match limits.daily_cap(tier) {
            Some(cap) => {
                QuotaRemaining::Limited(cap.saturating_sub(self.counted_today(now.date_naive())))
            }
            None => QuotaRemaining::Unbounded,
        }
    }

    /// True when the grant set or the purchase-time exam restricts which
    /// exams this user may enter.
    ///
    /// Individual accounts are always restricted; free and trial accounts
    /// only once an explicit grant exists (an empty grant set leaves the
    /// general pool open).
    #[must_use]
    pub fn restricts_exams(&self) -> bool {
        match self.tier {
            PlanTier::Individual => true,
            PlanTier::Free | PlanTier::Trial => !self.grants.is_empty(),
            PlanTier::Plus => false,
        }
    }

    /// True when the user may enter the given exam at `now`.
    #[must_use]
    pub fn has_exam_access(&self, exam: &ExamId, now: DateTime<Utc>) -> bool {
        if self.tier == PlanTier::Plus {
            return true;
        }
        if self.original_exam.as_ref() == Some(exam) {
            return true;
        }
        self.grants
            .iter()
            .any(|g| &g.exam == exam && g.is_active(now))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn state(tier: PlanTier) -> EntitlementState {
        EntitlementState::new(
            UserId::new("ana"),
            tier,
            AccountStatus::Active,
            None,
            0,
            None,
            None,
            Vec::new(),
        )
    }

    #[test]
    fn trial_days_count_down_and_clamp() {
        let limits = PlanLimits::default();
        let now = fixed_now();

        let mut s = state(PlanTier::Trial);
        s.trial_started_at = Some(now - Duration::days(10));
        assert_eq!(s.trial_days_remaining(&limits, now), 20);

        s.trial_started_at = Some(now - Duration::days(31));
        assert_eq!(s.trial_days_remaining(&limits, now), 0);
        assert_eq!(s.effective_tier(&limits, now), PlanTier::Free);
    }

    #[test]
    fn partial_trial_day_still_counts() {
        let limits = PlanLimits::default();
        let now = fixed_now();
        let mut s = state(PlanTier::Trial);
        s.trial_started_at = Some(now - Duration::hours(12));
        assert_eq!(s.trial_days_remaining(&limits, now), 30);
    }

    #[test]
    fn stale_counter_date_reads_as_zero() {
        let now = fixed_now();
        let today = now.date_naive();
        let mut s = state(PlanTier::Free);
        s.counted_today = 42;
        s.counter_date = today.pred_opt();
        assert_eq!(s.counted_today(today), 0);

        s.counter_date = Some(today);
        assert_eq!(s.counted_today(today), 42);
    }

    #[test]
    fn quota_is_unbounded_for_paid_tiers() {
        let limits = PlanLimits::default();
        let now = fixed_now();
        assert_eq!(
            state(PlanTier::Individual).quota_remaining(&limits, now),
            QuotaRemaining::Unbounded
        );
        assert_eq!(
            state(PlanTier::Plus).quota_remaining(&limits, now),
            QuotaRemaining::Unbounded
        );
    }

    #[test]
    fn lapsed_trial_falls_back_to_capped_quota() {
        let limits = PlanLimits::default();
        let now = fixed_now();
        let mut s = state(PlanTier::Trial);
        s.trial_started_at = Some(now - Duration::days(31));
        assert_eq!(
            s.quota_remaining(&limits, now),
            QuotaRemaining::Limited(limits.daily_question_cap())
        );
    }

    #[test]
    fn quota_remaining_floors_at_zero() {
        let limits = PlanLimits::default();
        let now = fixed_now();
        let mut s = state(PlanTier::Free);
        s.counter_date = Some(now.date_naive());

        s.counted_today = limits.daily_question_cap() - 1;
        assert_eq!(
            s.quota_remaining(&limits, now),
            QuotaRemaining::Limited(1)
        );

        // Consumption past the cap never goes negative.
        s.counted_today = limits.daily_question_cap() + 10;
        assert_eq!(
            s.quota_remaining(&limits, now),
            QuotaRemaining::Limited(0)
        );
        assert!(!s.quota_remaining(&limits, now).is_available());
    }

    #[test]
    fn expired_grant_does_not_give_access() {
        let now = fixed_now();
        let mut s = state(PlanTier::Free);
        s.grants = vec![
            ExamGrant::new(ExamId::new("INSS"), now - Duration::days(40))
                .expiring(now - Duration::days(10)),
        ];
        assert!(s.restricts_exams());
        assert!(!s.has_exam_access(&ExamId::new("INSS"), now));
    }

    #[test]
    fn individual_is_locked_to_its_original_exam() {
        let now = fixed_now();
        let mut s = state(PlanTier::Individual);
        s.original_exam = Some(ExamId::new("TRT-RJ"));
        assert!(s.has_exam_access(&ExamId::new("TRT-RJ"), now));
        assert!(!s.has_exam_access(&ExamId::new("INSS"), now));
    }

    #[test]
    fn plus_reaches_every_exam() {
        let now = fixed_now();
        let s = state(PlanTier::Plus);
        assert!(!s.restricts_exams());
        assert!(s.has_exam_access(&ExamId::new("INSS"), now));
    }
}
