//! Remote-wins read-through adapter for entitlement records.
//!
//! The primary store (the remote record store) is authoritative; the
//! mirror (a local cache) is strictly a fallback. Successful primary
//! reads overwrite the mirror, a failing primary falls back to the
//! mirror, and writes go primary-first with best-effort mirroring. All
//! reconciliation lives here; callers never merge the two sources.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use quiz_core::model::{AccountStatus, ExamId, PlanTier, UserId};

use crate::repository::{EntitlementRecord, EntitlementStore, StorageError};

#[derive(Clone)]
pub struct MirroredEntitlementStore {
    primary: Arc<dyn EntitlementStore>,
    mirror: Arc<dyn EntitlementStore>,
}

impl MirroredEntitlementStore {
    #[must_use]
    pub fn new(primary: Arc<dyn EntitlementStore>, mirror: Arc<dyn EntitlementStore>) -> Self {
        Self { primary, mirror }
    }
}

#[async_trait]
impl EntitlementStore for MirroredEntitlementStore {
    async fn read(&self, user: &UserId) -> Result<Option<EntitlementRecord>, StorageError> {
        match self.primary.read(user).await {
            Ok(Some(record)) => {
                // Remote wins: refresh the local copy on every good read.
                let _ = self.mirror.write_record(&record).await;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(_) => self.mirror.read(user).await,
        }
    }

    async fn write_record(&self, record: &EntitlementRecord) -> Result<(), StorageError> {
        self.primary.write_record(record).await?;
        let _ = self.mirror.write_record(record).await;
        Ok(())
    }

    async fn increment_quota(&self, user: &UserId, today: NaiveDate) -> Result<u32, StorageError> {
        let counted = self.primary.increment_quota(user, today).await?;
        // The mirrored counter may drift; resolvers re-read rather than
        // trust it, so a failed mirror increment is tolerable.
        let _ = self.mirror.increment_quota(user, today).await;
        Ok(counted)
    }

    async fn set_plan(
        &self,
        user: &UserId,
        tier: PlanTier,
        original_exam: Option<&ExamId>,
        changed_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.primary
            .set_plan(user, tier, original_exam, changed_at)
            .await?;
        let _ = self
            .mirror
            .set_plan(user, tier, original_exam, changed_at)
            .await;
        Ok(())
    }

    async fn write_grant(
        &self,
        user: &UserId,
        exam: &ExamId,
        granted_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        self.primary
            .write_grant(user, exam, granted_at, expires_at)
            .await?;
        let _ = self
            .mirror
            .write_grant(user, exam, granted_at, expires_at)
            .await;
        Ok(())
    }

    async fn revoke_grant(&self, user: &UserId, exam: &ExamId) -> Result<(), StorageError> {
        self.primary.revoke_grant(user, exam).await?;
        let _ = self.mirror.revoke_grant(user, exam).await;
        Ok(())
    }

    async fn set_status(&self, user: &UserId, status: AccountStatus) -> Result<(), StorageError> {
        self.primary.set_status(user, status).await?;
        let _ = self.mirror.set_status(user, status).await;
        Ok(())
    }

    async fn cancel_all_access(&self, user: &UserId) -> Result<(), StorageError> {
        self.primary.cancel_all_access(user).await?;
        let _ = self.mirror.cancel_all_access(user).await;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
