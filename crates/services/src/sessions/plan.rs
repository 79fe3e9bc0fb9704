use rand::seq::SliceRandom;

use quiz_core::model::{PlanTier, Question};

/// Selection result for a session build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingSet {
    pub questions: Vec<Question>,
    /// Questions dropped because their minimum tier exceeds the user's.
    pub tier_filtered: usize,
}

impl WorkingSet {
    /// Total number of questions selected.
    #[must_use]
    pub fn total(&self) -> usize {
        self.questions.len()
    }

    /// Returns true when no questions survived selection.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Builds a session's working set from the filtered question pool.
///
/// Drops questions the user's effective tier may not see, optionally
/// shuffles, and caps the set size. The result is frozen for the whole
/// run; repository order is kept when shuffling is off.
pub struct WorkingSetBuilder {
    tier: PlanTier,
    shuffle: bool,
    limit: Option<usize>,
}

impl WorkingSetBuilder {
    #[must_use]
    pub fn new(tier: PlanTier) -> Self {
        Self {
            tier,
            shuffle: false,
            limit: None,
        }
    }

    /// Enable or disable shuffling of the pool before capping.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Cap the working set at `limit` questions.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build the working set from a pool of questions.
    #[must_use]
    pub fn build(self, pool: impl IntoIterator<Item = Question>) -> WorkingSet {
        let pool: Vec<Question> = pool.into_iter().collect();
        let before = pool.len();

        let mut selected: Vec<Question> = pool
            .into_iter()
            .filter(|q| q.min_tier().is_none_or(|min| self.tier >= min))
            .collect();
        let tier_filtered = before - selected.len();

        if self.shuffle {
            let mut rng = rand::rng();
            selected.as_mut_slice().shuffle(&mut rng);
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }

        WorkingSet {
            questions: selected,
            tier_filtered,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
