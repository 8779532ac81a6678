use std::collections::HashSet;

use crate::config::DislikePolicy;
use crate::models::RawCandidate;

/// Library, history, and dislike state gathered once per run for filtering
#[derive(Debug, Clone, Default)]
pub struct FilterContext {
    pub library_ids: HashSet<i64>,
    pub watched_ids: HashSet<i64>,
    pub disliked_ids: HashSet<i64>,
    pub dislike_policy: Option<DislikePolicy>,
    pub reduce_factor: f32,
}

/// Filtered candidates plus removal counters for logging
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub candidates: Vec<RawCandidate>,
    pub removed_library: usize,
    pub removed_watched: usize,
    pub removed_disliked: usize,
}

/// Merges the personalized pool into the shared global pool
///
/// Personalized entries always win on tmdb-id collision; the output is the
/// personalized list followed by the remaining pool entries. Merging an
/// empty personalized set returns the pool unchanged.
pub fn merge_with_pool(
    personalized: Vec<RawCandidate>,
    pool: &[RawCandidate],
) -> Vec<RawCandidate> {
    let personalized_ids: HashSet<i64> = personalized.iter().map(|c| c.tmdb_id).collect();

    let mut merged = personalized;
    merged.extend(
        pool.iter()
            .filter(|c| !personalized_ids.contains(&c.tmdb_id))
            .cloned(),
    );

    merged
}

/// Removes already-owned, already-watched, and (per policy) disliked items
///
/// Under `Reduce` the disliked candidate survives with a score penalty that
/// the scorer applies to the composite.
pub fn filter_candidates(candidates: Vec<RawCandidate>, ctx: &FilterContext) -> FilterOutcome {
    let policy = ctx.dislike_policy.unwrap_or(DislikePolicy::Exclude);

    let mut kept = Vec::with_capacity(candidates.len());
    let mut removed_library = 0;
    let mut removed_watched = 0;
    let mut removed_disliked = 0;

    for mut candidate in candidates {
        if ctx.library_ids.contains(&candidate.tmdb_id) {
            removed_library += 1;
            continue;
        }
        if ctx.watched_ids.contains(&candidate.tmdb_id) {
            removed_watched += 1;
            continue;
        }
        if ctx.disliked_ids.contains(&candidate.tmdb_id) {
            match policy {
                DislikePolicy::Exclude => {
                    removed_disliked += 1;
                    continue;
                }
                DislikePolicy::Reduce => {
                    candidate.score_penalty = Some(ctx.reduce_factor);
                }
                DislikePolicy::Ignore => {}
            }
        }
        kept.push(candidate);
    }

    tracing::debug!(
        kept = kept.len(),
        removed_library,
        removed_watched,
        removed_disliked,
        "Filtered candidates"
    );

    FilterOutcome {
        candidates: kept,
        removed_library,
        removed_watched,
        removed_disliked,
    }
}
