//! Dedup Registry
//!
//! Run-scoped set of repository ids that have already been handed to the
//! synchronizer. Owned by the run and shared by reference; never persisted.

use dashmap::DashSet;

use crate::api::RepoId;

#[derive(Debug, Default)]
pub struct DedupRegistry {
    claimed: DashSet<RepoId>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id` for this run. Returns `false` if it was already claimed.
    ///
    /// Check-and-set is a single atomic insert, so concurrent syncs within a
    /// group cannot both win the same id.
    pub fn try_claim(&self, id: &RepoId) -> bool {
        self.claimed.insert(id.clone())
    }

    #[cfg(test)]
    pub(crate) fn is_claimed(&self, id: &RepoId) -> bool {
        self.claimed.contains(id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.claimed.len()
    }
}
