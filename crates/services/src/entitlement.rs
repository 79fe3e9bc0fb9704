//! Entitlement resolution and the admin command surface.

use std::sync::Arc;

use quiz_core::Clock;
use quiz_core::model::{
    AccountStatus, EntitlementState, ExamGrant, ExamId, PlanLimits, PlanTier, UserId,
};
use storage::repository::{EntitlementRecord, EntitlementStore};

use crate::error::AdminError;

//
// ─── RESOLVER ──────────────────────────────────────────────────────────────────
//

/// Computes the effective entitlement for a user from the raw plan
/// record.
///
/// `resolve` is deliberately infallible: a store failure or a missing
/// record yields the safe default free-tier state, so an unresolvable
/// user behaves exactly like a brand-new one instead of being blocked.
#[derive(Clone)]
pub struct EntitlementResolver {
    store: Arc<dyn EntitlementStore>,
    limits: PlanLimits,
    clock: Clock,
}

impl EntitlementResolver {
    #[must_use]
    pub fn new(store: Arc<dyn EntitlementStore>, limits: PlanLimits, clock: Clock) -> Self {
        Self {
            store,
            limits,
            clock,
        }
    }

    #[must_use]
    pub fn limits(&self) -> &PlanLimits {
        &self.limits
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Resolve the current entitlement state for a user.
    ///
    /// The raw record's loosely-typed plan and status strings are
    /// interpreted here, once; unset values default to an active free
    /// account. The daily counter is read through the reset-date marker,
    /// so a stale marker reads as zero consumed without any write.
    pub async fn resolve(&self, user: &UserId) -> EntitlementState {
        match self.store.read(user).await {
            Ok(Some(record)) => interpret(record),
            Ok(None) => EntitlementState::default_free(user.clone()),
            Err(err) => {
                tracing::warn!(user = %user, error = %err, "entitlement read failed, using free default");
                EntitlementState::default_free(user.clone())
            }
        }
    }

    /// Charge one quota unit for a revealed answer.
    ///
    /// Only finitely-capped tiers consume quota. The write is best-effort:
    /// the store is eventually consistent and the counter is re-read on
    /// every resolution, so a failed increment is logged and tolerated.
    pub async fn consume_quota(&self, entitlement: &EntitlementState) {
        let now = self.clock.now();
        if !entitlement.effective_tier(&self.limits, now).is_capped() {
            return;
        }
        if let Err(err) = self
            .store
            .increment_quota(entitlement.user_id(), self.clock.today())
            .await
        {
            tracing::warn!(
                user = %entitlement.user_id(),
                error = %err,
                "quota increment failed"
            );
        }
    }
}

/// Interprets a raw record into a resolved state.
fn interpret(record: EntitlementRecord) -> EntitlementState {
    let tier = PlanTier::from_record(record.plan.as_deref());
    let status = AccountStatus::from_record(record.status.as_deref());
    let grants = record
        .grants
        .into_iter()
        .map(|g| ExamGrant {
            exam: ExamId::new(g.exam),
            granted_at: g.granted_at,
            expires_at: g.expires_at,
        })
        .collect();

    EntitlementState::new(
        record.user_id,
        tier,
        status,
        record.trial_started_at,
        record.counted_today,
        record.counter_date,
        record.original_exam.map(ExamId::new),
        grants,
    )
}

//
// ─── ADMIN COMMANDS ────────────────────────────────────────────────────────────
//

/// Back-office mutations of entitlement records.
///
/// Each command is a direct field mutation through the store; the engine
/// itself only ever reads the result on the next resolution.
#[derive(Clone)]
pub struct EntitlementAdmin {
    store: Arc<dyn EntitlementStore>,
    clock: Clock,
}

impl EntitlementAdmin {
    #[must_use]
    pub fn new(store: Arc<dyn EntitlementStore>, clock: Clock) -> Self {
        Self { store, clock }
    }

    /// Set the user's plan; `original_exam` records the purchased exam
    /// for the individual tier. Entering trial stamps its start once.
    ///
    /// # Errors
    ///
    /// Returns `AdminError` on storage failure.
    pub async fn set_plan(
        &self,
        user: &UserId,
        tier: PlanTier,
        original_exam: Option<&ExamId>,
    ) -> Result<(), AdminError> {
        self.store
            .set_plan(user, tier, original_exam, self.clock.now())
            .await?;
        Ok(())
    }

    /// Grant access to an exam, optionally expiring after `expires_in_days`.
    ///
    /// # Errors
    ///
    /// Returns `AdminError` on storage failure.
    pub async fn grant_access(
        &self,
        user: &UserId,
        exam: &ExamId,
        expires_in_days: Option<i64>,
    ) -> Result<(), AdminError> {
        let now = self.clock.now();
        let expires_at = expires_in_days.map(|days| now + chrono::Duration::days(days));
        self.store.write_grant(user, exam, now, expires_at).await?;
        Ok(())
    }

    /// Revoke a previously granted exam.
    ///
    /// # Errors
    ///
    /// Returns `AdminError` on storage failure.
    pub async fn revoke_access(&self, user: &UserId, exam: &ExamId) -> Result<(), AdminError> {
        self.store.revoke_grant(user, exam).await?;
        Ok(())
    }

    /// Suspend the account.
    ///
    /// # Errors
    ///
    /// Returns `AdminError` on storage failure.
    pub async fn suspend(&self, user: &UserId) -> Result<(), AdminError> {
        self.store.set_status(user, AccountStatus::Suspended).await?;
        Ok(())
    }

    /// Reactivate a suspended account.
    ///
    /// # Errors
    ///
    /// Returns `AdminError` on storage failure.
    pub async fn reactivate(&self, user: &UserId) -> Result<(), AdminError> {
        self.store.set_status(user, AccountStatus::Active).await?;
        Ok(())
    }

    /// Drop every grant and paid plan, returning the account to free.
    ///
    /// # Errors
    ///
    /// Returns `AdminError` on storage failure.
    pub async fn cancel_all_access(&self, user: &UserId) -> Result<(), AdminError> {
        self.store.cancel_all_access(user).await?;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
