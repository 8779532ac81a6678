use std::collections::HashMap;

use crate::models::{ScoredCandidate, SelectionResult};

/// A candidate whose genres already average at least this share of the
/// current selections is deferred within the lookahead window
const OVERREP_THRESHOLD: f32 = 0.5;

/// Greedy, diversity-aware top-N selection
///
/// Picks the best remaining candidate by composite score, but re-evaluates
/// each pick's genres against what is already selected: an overrepresented
/// candidate is deferred within a bounded lookahead window and the next
/// acceptable candidate is taken instead. Deferred candidates stay eligible
/// for later rounds. Deterministic for identical inputs; requesting more
/// than is available returns everything without error.
pub fn select_top_n(
    ranked: Vec<ScoredCandidate>,
    target: usize,
    lookahead: usize,
) -> SelectionResult {
    let mut used = vec![false; ranked.len()];
    let mut selected = Vec::with_capacity(target.min(ranked.len()));
    let mut selected_indices = Vec::with_capacity(target.min(ranked.len()));
    let mut genre_counts: HashMap<String, u32> = HashMap::new();

    while selected.len() < target {
        let window: Vec<usize> = (0..ranked.len())
            .filter(|&i| !used[i])
            .take(lookahead + 1)
            .collect();

        let Some(&head) = window.first() else {
            break;
        };

        let pick = if is_overrepresented(&ranked[head], &genre_counts, selected.len()) {
            // Defer the head: take the first in-window candidate that adds
            // genre variety, falling back to the head when none does
            window
                .iter()
                .copied()
                .find(|&i| !is_overrepresented(&ranked[i], &genre_counts, selected.len()))
                .unwrap_or(head)
        } else {
            head
        };

        if pick != head {
            tracing::debug!(
                deferred_tmdb_id = ranked[head].candidate.tmdb_id,
                picked_tmdb_id = ranked[pick].candidate.tmdb_id,
                "Deferred overrepresented candidate"
            );
        }

        used[pick] = true;
        for genre in &ranked[pick].candidate.genres {
            *genre_counts.entry(genre.clone()).or_insert(0) += 1;
        }
        selected.push(ranked[pick].clone());
        selected_indices.push(pick);
    }

    tracing::info!(
        selected = selected.len(),
        requested = target,
        available = ranked.len(),
        "Selection completed"
    );

    SelectionResult {
        selected,
        ranked,
        selected_indices,
    }
}

/// Whether a candidate's genres are already overrepresented in the selection
fn is_overrepresented(
    candidate: &ScoredCandidate,
    genre_counts: &HashMap<String, u32>,
    selected_count: usize,
) -> bool {
    if selected_count == 0 || candidate.candidate.genres.is_empty() {
        return false;
    }

    let total_share: f32 = candidate
        .candidate
        .genres
        .iter()
        .map(|g| genre_counts.get(g).copied().unwrap_or(0) as f32 / selected_count as f32)
        .sum();
    let mean_share = total_share / candidate.candidate.genres.len() as f32;

    mean_share >= OVERREP_THRESHOLD
}
