//! Snapshot persistence for pause/resume.
//!
//! Serializes [`SessionSnapshot`]s to JSON blobs behind the schema-opaque
//! [`ProgressStore`] interface. Saves are whole-record replaces; a blob
//! that fails to decode or validate is treated as absent and cleared, so
//! corrupted resume state can never block starting a fresh session.

use std::sync::Arc;

use quiz_core::model::{SessionSnapshot, UserId};
use storage::repository::{ProgressStore, StorageError};

#[derive(Clone)]
pub struct ProgressService {
    store: Arc<dyn ProgressStore>,
}

impl ProgressService {
    #[must_use]
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    /// Persist the snapshot, replacing whatever was stored before.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if encoding or the store write fails.
    pub async fn save(&self, user: &UserId, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let blob = serde_json::to_string(snapshot)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.set(user, &blob).await?;
        tracing::debug!(user = %user, "session snapshot saved");
        Ok(())
    }

    /// Load the user's saved snapshot, if any.
    ///
    /// A structurally invalid blob (failed decode or invariant check) is
    /// discarded and reported as absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only for store read failures, never for
    /// corruption.
    pub async fn load(&self, user: &UserId) -> Result<Option<SessionSnapshot>, StorageError> {
        let Some(blob) = self.store.get(user).await? else {
            return Ok(None);
        };

        let snapshot = serde_json::from_str::<SessionSnapshot>(&blob)
            .map_err(|e| e.to_string())
            .and_then(|snap| snap.validate().map(|()| snap).map_err(|e| e.to_string()));

        match snapshot {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(reason) => {
                tracing::warn!(user = %user, %reason, "discarding corrupt session snapshot");
                if let Err(err) = self.store.clear(user).await {
                    tracing::warn!(user = %user, error = %err, "failed to clear corrupt snapshot");
                }
                Ok(None)
            }
        }
    }

    /// Remove any saved snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on store failure.
    pub async fn clear(&self, user: &UserId) -> Result<(), StorageError> {
        self.store.clear(user).await
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
