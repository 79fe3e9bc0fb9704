use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use quiz_core::model::{
    AccountStatus, ExamId, PlanTier, Question, QuestionFilter, QuestionId, QuizSummary, UserId,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RAW ENTITLEMENT RECORD ────────────────────────────────────────────────────
//

/// One exam-access grant as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub exam: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Persisted shape of a user's plan record.
///
/// Plan and status are kept as the loosely-typed strings the store holds;
/// the entitlement resolver interprets them exactly once. Repositories
/// read and write this shape without imposing domain rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementRecord {
    pub user_id: UserId,
    pub plan: Option<String>,
    pub status: Option<String>,
    pub trial_started_at: Option<DateTime<Utc>>,
    pub counted_today: u32,
    pub counter_date: Option<NaiveDate>,
    pub original_exam: Option<String>,
    pub grants: Vec<GrantRecord>,
}

impl EntitlementRecord {
    /// Empty record for a user the store has never seen.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            plan: None,
            status: None,
            trial_started_at: None,
            counted_today: 0,
            counter_date: None,
            original_exam: None,
            grants: Vec::new(),
        }
    }
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Repository contract for the question pool.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Persist or update a question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Ordered pool of questions matching the filter.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure; an empty match is `Ok`.
    async fn working_set(&self, filter: &QuestionFilter) -> Result<Vec<Question>, StorageError>;

    /// Fetch questions by id, preserving the requested order.
    ///
    /// Used to rebuild a resumed session's frozen working set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any id is missing, or other
    /// storage errors.
    async fn questions_by_ids(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError>;
}

/// Repository contract for plan records, grants and the daily counter.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Raw plan record for a user, `None` when the store has never seen
    /// them.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure.
    async fn read(&self, user: &UserId) -> Result<Option<EntitlementRecord>, StorageError>;

    /// Whole-record replace, used by the read-through mirror.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn write_record(&self, record: &EntitlementRecord) -> Result<(), StorageError>;

    /// Add one to today's answered-question counter and return the new
    /// value. A counter carrying a stale reset-date restarts at 1.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure.
    async fn increment_quota(&self, user: &UserId, today: NaiveDate) -> Result<u32, StorageError>;

    /// Set the user's plan. Switching to trial stamps the trial start on
    /// first entry; `original_exam` records the purchase-time exam for
    /// the individual tier.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure.
    async fn set_plan(
        &self,
        user: &UserId,
        tier: PlanTier,
        original_exam: Option<&ExamId>,
        changed_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Grant access to an exam, replacing any existing grant for it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure.
    async fn write_grant(
        &self,
        user: &UserId,
        exam: &ExamId,
        granted_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError>;

    /// Remove the grant for an exam, if present.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure.
    async fn revoke_grant(&self, user: &UserId, exam: &ExamId) -> Result<(), StorageError>;

    /// Set the account lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure.
    async fn set_status(&self, user: &UserId, status: AccountStatus) -> Result<(), StorageError>;

    /// Drop every grant, the original exam and the paid plan (back to
    /// free).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure.
    async fn cancel_all_access(&self, user: &UserId) -> Result<(), StorageError>;
}

/// Generic per-user blob persistence for paused sessions.
///
/// The store is schema-opaque: blobs are written and read back verbatim.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Stored blob for a user, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure.
    async fn get(&self, user: &UserId) -> Result<Option<String>, StorageError>;

    /// Whole-record replace of the user's blob.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure.
    async fn set(&self, user: &UserId, blob: &str) -> Result<(), StorageError>;

    /// Remove the user's blob; removing an absent blob is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure.
    async fn clear(&self, user: &UserId) -> Result<(), StorageError>;
}

/// Repository contract for finished-run summaries.
#[async_trait]
pub trait SummaryRepository: Send + Sync {
    /// Append a finished run's summary.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the summary cannot be stored.
    async fn append_summary(&self, summary: &QuizSummary) -> Result<(), StorageError>;

    /// Most recent summaries for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure.
    async fn summaries_for_user(
        &self,
        user: &UserId,
        limit: u32,
    ) -> Result<Vec<QuizSummary>, StorageError>;
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

/// Simple in-memory store implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    questions: Arc<Mutex<BTreeMap<QuestionId, Question>>>,
    entitlements: Arc<Mutex<HashMap<UserId, EntitlementRecord>>>,
    progress: Arc<Mutex<HashMap<UserId, String>>>,
    summaries: Arc<Mutex<Vec<QuizSummary>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl QuestionRepository for InMemoryStore {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self.questions.lock().map_err(lock_err)?;
        guard.insert(question.id(), question.clone());
        Ok(())
    }

    async fn working_set(&self, filter: &QuestionFilter) -> Result<Vec<Question>, StorageError> {
        let guard = self.questions.lock().map_err(lock_err)?;
        Ok(guard
            .values()
            .filter(|q| filter.matches(q))
            .cloned()
            .collect())
    }

    async fn questions_by_ids(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        let guard = self.questions.lock().map_err(lock_err)?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            match guard.get(id) {
                Some(question) => found.push(question.clone()),
                None => return Err(StorageError::NotFound),
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl EntitlementStore for InMemoryStore {
    async fn read(&self, user: &UserId) -> Result<Option<EntitlementRecord>, StorageError> {
        let guard = self.entitlements.lock().map_err(lock_err)?;
        Ok(guard.get(user).cloned())
    }

    async fn write_record(&self, record: &EntitlementRecord) -> Result<(), StorageError> {
        let mut guard = self.entitlements.lock().map_err(lock_err)?;
        guard.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn increment_quota(&self, user: &UserId, today: NaiveDate) -> Result<u32, StorageError> {
        let mut guard = self.entitlements.lock().map_err(lock_err)?;
        let record = guard
            .entry(user.clone())
            .or_insert_with(|| EntitlementRecord::new(user.clone()));
        if record.counter_date == Some(today) {
            record.counted_today = record.counted_today.saturating_add(1);
        } else {
            record.counted_today = 1;
            record.counter_date = Some(today);
        }
        Ok(record.counted_today)
    }

    async fn set_plan(
        &self,
        user: &UserId,
        tier: PlanTier,
        original_exam: Option<&ExamId>,
        changed_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.entitlements.lock().map_err(lock_err)?;
        let record = guard
            .entry(user.clone())
            .or_insert_with(|| EntitlementRecord::new(user.clone()));
        record.plan = Some(tier.as_str().to_owned());
        if let Some(exam) = original_exam {
            record.original_exam = Some(exam.as_str().to_owned());
        }
        if tier == PlanTier::Trial && record.trial_started_at.is_none() {
            record.trial_started_at = Some(changed_at);
        }
        Ok(())
    }

    async fn write_grant(
        &self,
        user: &UserId,
        exam: &ExamId,
        granted_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        let mut guard = self.entitlements.lock().map_err(lock_err)?;
        let record = guard
            .entry(user.clone())
            .or_insert_with(|| EntitlementRecord::new(user.clone()));
        let grant = GrantRecord {
            exam: exam.as_str().to_owned(),
            granted_at,
            expires_at,
        };
        match record.grants.iter_mut().find(|g| g.exam == grant.exam) {
            Some(existing) => *existing = grant,
            None => record.grants.push(grant),
        }
        Ok(())
    }

    async fn revoke_grant(&self, user: &UserId, exam: &ExamId) -> Result<(), StorageError> {
        let mut guard = self.entitlements.lock().map_err(lock_err)?;
        if let Some(record) = guard.get_mut(user) {
            record.grants.retain(|g| g.exam != exam.as_str());
        }
        Ok(())
    }

    async fn set_status(&self, user: &UserId, status: AccountStatus) -> Result<(), StorageError> {
        let mut guard = self.entitlements.lock().map_err(lock_err)?;
        let record = guard
            .entry(user.clone())
            .or_insert_with(|| EntitlementRecord::new(user.clone()));
        record.status = Some(status.as_str().to_owned());
        Ok(())
    }

    async fn cancel_all_access(&self, user: &UserId) -> Result<(), StorageError> {
        let mut guard = self.entitlements.lock().map_err(lock_err)?;
        if let Some(record) = guard.get_mut(user) {
            record.grants.clear();
            record.original_exam = None;
            record.plan = Some(PlanTier::Free.as_str().to_owned());
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for InMemoryStore {
    async fn get(&self, user: &UserId) -> Result<Option<String>, StorageError> {
        let guard = self.progress.lock().map_err(lock_err)?;
        Ok(guard.get(user).cloned())
    }

    async fn set(&self, user: &UserId, blob: &str) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(lock_err)?;
        guard.insert(user.clone(), blob.to_owned());
        Ok(())
    }

    async fn clear(&self, user: &UserId) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(lock_err)?;
        guard.remove(user);
        Ok(())
    }
}

#[async_trait]
impl SummaryRepository for InMemoryStore {
    async fn append_summary(&self, summary: &QuizSummary) -> Result<(), StorageError> {
        let mut guard = self.summaries.lock().map_err(lock_err)?;
        guard.push(summary.clone());
        Ok(())
    }

    async fn summaries_for_user(
        &self,
        user: &UserId,
        limit: u32,
    ) -> Result<Vec<QuizSummary>, StorageError> {
        let guard = self.summaries.lock().map_err(lock_err)?;
        let mut out: Vec<QuizSummary> = guard
            .iter()
            .filter(|s| s.user_id() == user)
            .cloned()
            .collect();
        out.sort_by_key(|s| std::cmp::Reverse(s.completed_at()));
        out.truncate(limit as usize);
        Ok(out)
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the four repositories behind trait objects for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionRepository>,
    pub entitlements: Arc<dyn EntitlementStore>,
    pub progress: Arc<dyn ProgressStore>,
    pub summaries: Arc<dyn SummaryRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let store = InMemoryStore::new();
        let questions: Arc<dyn QuestionRepository> = Arc::new(store.clone());
        let entitlements: Arc<dyn EntitlementStore> = Arc::new(store.clone());
        let progress: Arc<dyn ProgressStore> = Arc::new(store.clone());
        let summaries: Arc<dyn SummaryRepository> = Arc::new(store);
        Self {
            questions,
            entitlements,
            progress,
            summaries,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
