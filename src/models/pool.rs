use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{MediaType, RawCandidate};

/// A versioned, immutable snapshot of the shared GLOBAL candidate pool
///
/// The scheduled refresh job writes one snapshot per media type; per-user
/// runs hold a snapshot reference instead of live-reading a mutating
/// structure. Readers may observe the previous snapshot mid-refresh, which
/// is acceptable (eventual consistency, no locking).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub media_type: MediaType,
    /// Staleness marker; set when the snapshot was fetched
    pub fetched_at: DateTime<Utc>,
    pub candidates: Vec<RawCandidate>,
    /// How many candidates each global source contributed, including zeros
    /// for failed or unconfigured sources
    pub per_source_counts: HashMap<String, usize>,
    pub total_fetched: usize,
}

impl PoolSnapshot {
    pub fn new(
        media_type: MediaType,
        candidates: Vec<RawCandidate>,
        per_source_counts: HashMap<String, usize>,
        total_fetched: usize,
    ) -> Self {
        Self {
            media_type,
            fetched_at: Utc::now(),
            candidates,
            per_source_counts,
            total_fetched,
        }
    }

    /// An empty snapshot, used when no pool has been cached yet
    pub fn empty(media_type: MediaType) -> Self {
        Self::new(media_type, Vec::new(), HashMap::new(), 0)
    }

    /// Whether this snapshot is older than the given maximum age
    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        Utc::now() - self.fetched_at > max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateSource;

    #[test]
    fn test_fresh_snapshot_is_not_stale() {
        let snapshot = PoolSnapshot::empty(MediaType::Movie);
        assert!(!snapshot.is_stale(chrono::Duration::hours(6)));
    }

    #[test]
    fn test_old_snapshot_is_stale() {
        let mut snapshot = PoolSnapshot::empty(MediaType::Series);
        snapshot.fetched_at = Utc::now() - chrono::Duration::hours(12);
        assert!(snapshot.is_stale(chrono::Duration::hours(6)));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let candidate =
            RawCandidate::new(27205, MediaType::Movie, "Inception", CandidateSource::Trending);
        let mut counts = HashMap::new();
        counts.insert("trending".to_string(), 1);
        let snapshot = PoolSnapshot::new(MediaType::Movie, vec![candidate], counts, 1);

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: PoolSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.candidates.len(), 1);
        assert_eq!(restored.candidates[0].tmdb_id, 27205);
        assert_eq!(restored.per_source_counts.get("trending"), Some(&1));
    }
}
