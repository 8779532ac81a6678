use std::collections::{HashMap, HashSet};

use crate::config::ScoringWeights;
use crate::models::{RawCandidate, ScoredCandidate};

/// How many preliminary-top candidates feed the diversity genre pool
const DIVERSITY_POOL: usize = 50;

/// Weight of pool overlap vs. consumption overlap inside the diversity penalty
const POOL_OVERLAP_WEIGHT: f32 = 0.7;
const HISTORY_OVERLAP_WEIGHT: f32 = 0.3;

/// Diversity for candidates without genre tags; nothing to compare against
const NEUTRAL_DIVERSITY: f32 = 0.5;

/// Per-user signals gathered once per run and consumed by the scorer
#[derive(Debug, Clone, Default)]
pub struct UserSignals {
    /// Aggregated taste embedding; absent for users with no watch history
    pub taste_vector: Option<Vec<f32>>,
    /// Genre → play count over recent consumption
    pub genre_history: HashMap<String, u32>,
    /// Titles recommended to this user in recent runs
    pub recently_recommended: HashSet<i64>,
}

/// Scores candidates on four independent [0,1] components and a weighted
/// composite, then sorts them deterministically
///
/// Embeddings arrive pre-fetched per candidate so scoring itself stays a
/// pure function: identical inputs always produce identical output order
/// (ties broken by popularity descending, then tmdb id ascending).
pub fn score_candidates(
    candidates: Vec<RawCandidate>,
    embeddings: &HashMap<i64, Vec<f32>>,
    signals: &UserSignals,
    weights: ScoringWeights,
    min_vote_count: u32,
) -> Vec<ScoredCandidate> {
    // First pass: the three diversity-independent components
    let partial: Vec<(RawCandidate, f32, f32, f32)> = candidates
        .into_iter()
        .map(|candidate| {
            let similarity = similarity_score(&candidate, embeddings, signals);
            let novelty = novelty_score(&candidate, signals);
            let rating = rating_score(&candidate, min_vote_count);
            (candidate, similarity, novelty, rating)
        })
        .collect();

    // Preliminary ranking decides which genres count as "currently
    // high-scoring" for the diversity penalty
    let mut prelim_order: Vec<usize> = (0..partial.len()).collect();
    prelim_order.sort_by(|&a, &b| {
        let score_a = prelim_score(&partial[a], weights);
        let score_b = prelim_score(&partial[b], weights);
        score_b
            .total_cmp(&score_a)
            .then_with(|| partial[a].0.tmdb_id.cmp(&partial[b].0.tmdb_id))
    });

    let mut pool_genre_counts: HashMap<String, u32> = HashMap::new();
    for &idx in prelim_order.iter().take(DIVERSITY_POOL) {
        for genre in &partial[idx].0.genres {
            *pool_genre_counts.entry(genre.clone()).or_insert(0) += 1;
        }
    }
    let max_genre_count = pool_genre_counts.values().copied().max().unwrap_or(1);

    let mut scored: Vec<ScoredCandidate> = partial
        .into_iter()
        .map(|(candidate, similarity, novelty, rating)| {
            let diversity =
                diversity_score(&candidate, &pool_genre_counts, max_genre_count, signals);

            let mut final_score = weights.similarity * similarity
                + weights.novelty * novelty
                + weights.rating * rating
                + weights.diversity * diversity;

            if let Some(penalty) = candidate.score_penalty {
                final_score *= penalty;
            }

            ScoredCandidate {
                candidate,
                similarity,
                novelty,
                rating,
                diversity,
                final_score,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| {
                b.candidate
                    .popularity
                    .unwrap_or(0.0)
                    .total_cmp(&a.candidate.popularity.unwrap_or(0.0))
            })
            .then_with(|| a.candidate.tmdb_id.cmp(&b.candidate.tmdb_id))
    });

    tracing::debug!(
        scored = scored.len(),
        top_score = scored.first().map(|s| s.final_score),
        "Scoring completed"
    );

    scored
}

fn prelim_score(entry: &(RawCandidate, f32, f32, f32), weights: ScoringWeights) -> f32 {
    weights.similarity * entry.1 + weights.novelty * entry.2 + weights.rating * entry.3
}

/// Cosine of the candidate embedding against the user taste vector
///
/// Neutral zero when either vector is missing, so users without watch
/// history still get rating/novelty-driven rankings.
fn similarity_score(
    candidate: &RawCandidate,
    embeddings: &HashMap<i64, Vec<f32>>,
    signals: &UserSignals,
) -> f32 {
    let Some(taste) = signals.taste_vector.as_deref() else {
        return 0.0;
    };
    let Some(embedding) = embeddings.get(&candidate.tmdb_id) else {
        return 0.0;
    };

    cosine_similarity(embedding, taste).clamp(0.0, 1.0)
}

/// Inverse of how exposed the user already is to this kind of content
///
/// Recently recommended titles score zero; otherwise the penalty is the
/// candidate's average genre familiarity relative to the user's
/// most-consumed genre. Unexposed content scores highest.
fn novelty_score(candidate: &RawCandidate, signals: &UserSignals) -> f32 {
    if signals.recently_recommended.contains(&candidate.tmdb_id) {
        return 0.0;
    }
    if candidate.genres.is_empty() || signals.genre_history.is_empty() {
        return 1.0;
    }

    let max_plays = signals.genre_history.values().copied().max().unwrap_or(1).max(1) as f32;
    let familiarity: f32 = candidate
        .genres
        .iter()
        .map(|g| {
            signals.genre_history.get(g.as_str()).copied().unwrap_or(0) as f32 / max_plays
        })
        .sum::<f32>()
        / candidate.genres.len() as f32;

    (1.0 - familiarity).clamp(0.0, 1.0)
}

/// Normalized external rating, gated by a minimum vote count
fn rating_score(candidate: &RawCandidate, min_vote_count: u32) -> f32 {
    if candidate.vote_count.unwrap_or(0) < min_vote_count {
        return 0.0;
    }
    (candidate.vote_average.unwrap_or(0.0) / 10.0).clamp(0.0, 1.0)
}

/// Genre-overlap penalty against the current high scorers and recent
/// consumption
fn diversity_score(
    candidate: &RawCandidate,
    pool_genre_counts: &HashMap<String, u32>,
    max_genre_count: u32,
    signals: &UserSignals,
) -> f32 {
    if candidate.genres.is_empty() {
        return NEUTRAL_DIVERSITY;
    }

    let pool_overlap: f32 = candidate
        .genres
        .iter()
        .map(|g| {
            pool_genre_counts.get(g.as_str()).copied().unwrap_or(0) as f32
                / max_genre_count.max(1) as f32
        })
        .sum::<f32>()
        / candidate.genres.len() as f32;

    let history_overlap = candidate
        .genres
        .iter()
        .filter(|g| signals.genre_history.contains_key(g.as_str()))
        .count() as f32
        / candidate.genres.len() as f32;

    let penalty = POOL_OVERLAP_WEIGHT * pool_overlap + HISTORY_OVERLAP_WEIGHT * history_overlap;
    (1.0 - penalty).clamp(0.0, 1.0)
}

/// Cosine similarity between two embeddings; zero for mismatched or
/// zero-magnitude vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateSource, MediaType};

    fn candidate(tmdb_id: i64, genres: &[&str]) -> RawCandidate {
        let mut c = RawCandidate::new(
            tmdb_id,
            MediaType::Movie,
            &format!("Title {}", tmdb_id),
            CandidateSource::Popular,
        );
        c.genres = genres.iter().map(|g| g.to_string()).collect();
        c.vote_average = Some(7.0);
        c.vote_count = Some(100);
        c.popularity = Some(tmdb_id as f32);
        c
    }

    fn unit_weights() -> ScoringWeights {
        ScoringWeights {
            similarity: 0.25,
            novelty: 0.25,
            rating: 0.25,
            diversity: 0.25,
        }
    }

    #[test]
    fn test_cosine_similarity_identical_vectors() {
        let v = vec![0.5, 0.3, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_all_components_in_range() {
        let mut signals = UserSignals::default();
        signals.taste_vector = Some(vec![1.0, 0.0]);
        signals.genre_history.insert("Drama".to_string(), 10);
        signals.recently_recommended.insert(3);

        let mut embeddings = HashMap::new();
        embeddings.insert(1, vec![0.7, 0.7]);

        let candidates = vec![
            candidate(1, &["Drama"]),
            candidate(2, &["Comedy", "Drama"]),
            candidate(3, &[]),
        ];

        let scored = score_candidates(candidates, &embeddings, &signals, unit_weights(), 20);

        for s in &scored {
            assert!((0.0..=1.0).contains(&s.similarity), "similarity {}", s.similarity);
            assert!((0.0..=1.0).contains(&s.novelty), "novelty {}", s.novelty);
            assert!((0.0..=1.0).contains(&s.rating), "rating {}", s.rating);
            assert!((0.0..=1.0).contains(&s.diversity), "diversity {}", s.diversity);
        }
    }

    #[test]
    fn test_no_taste_vector_gives_neutral_similarity() {
        let signals = UserSignals::default();
        let embeddings = HashMap::new();

        let scored = score_candidates(
            vec![candidate(1, &["Drama"]), candidate(2, &["Action"])],
            &embeddings,
            &signals,
            unit_weights(),
            20,
        );

        assert!(scored.iter().all(|s| s.similarity == 0.0));
        // Rating still differentiates nothing here, but scoring must not panic
        assert_eq!(scored.len(), 2);
    }

    #[test]
    fn test_recently_recommended_has_zero_novelty() {
        let mut signals = UserSignals::default();
        signals.recently_recommended.insert(1);

        let scored = score_candidates(
            vec![candidate(1, &["Drama"]), candidate(2, &["Drama"])],
            &HashMap::new(),
            &signals,
            unit_weights(),
            20,
        );

        let reexposed = scored.iter().find(|s| s.candidate.tmdb_id == 1).unwrap();
        let fresh = scored.iter().find(|s| s.candidate.tmdb_id == 2).unwrap();
        assert_eq!(reexposed.novelty, 0.0);
        assert_eq!(fresh.novelty, 1.0);
    }

    #[test]
    fn test_rating_gated_by_vote_count() {
        let mut low_votes = candidate(1, &[]);
        low_votes.vote_average = Some(9.5);
        low_votes.vote_count = Some(3);

        let scored = score_candidates(
            vec![low_votes],
            &HashMap::new(),
            &UserSignals::default(),
            unit_weights(),
            20,
        );

        assert_eq!(scored[0].rating, 0.0);
    }

    #[test]
    fn test_overrepresented_genre_scores_lower_diversity() {
        let candidates = vec![
            candidate(1, &["Action"]),
            candidate(2, &["Action"]),
            candidate(3, &["Action"]),
            candidate(4, &["Documentary"]),
        ];

        let scored = score_candidates(
            candidates,
            &HashMap::new(),
            &UserSignals::default(),
            unit_weights(),
            20,
        );

        let action = scored.iter().find(|s| s.candidate.tmdb_id == 1).unwrap();
        let documentary = scored.iter().find(|s| s.candidate.tmdb_id == 4).unwrap();
        assert!(documentary.diversity > action.diversity);
    }

    #[test]
    fn test_composite_is_weighted_sum() {
        let scored = score_candidates(
            vec![candidate(1, &["Drama"])],
            &HashMap::new(),
            &UserSignals::default(),
            unit_weights(),
            20,
        );

        let s = &scored[0];
        let expected =
            0.25 * s.similarity + 0.25 * s.novelty + 0.25 * s.rating + 0.25 * s.diversity;
        assert!((s.final_score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_reduce_penalty_applies_to_composite() {
        let mut penalized = candidate(1, &["Drama"]);
        penalized.score_penalty = Some(0.5);
        let plain = candidate(2, &["Drama"]);

        let scored = score_candidates(
            vec![penalized, plain],
            &HashMap::new(),
            &UserSignals::default(),
            unit_weights(),
            20,
        );

        let p = scored.iter().find(|s| s.candidate.tmdb_id == 1).unwrap();
        let q = scored.iter().find(|s| s.candidate.tmdb_id == 2).unwrap();
        assert!((p.final_score - q.final_score * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sort_is_deterministic_with_tied_scores() {
        // Identical scores, popularity breaks the tie, then tmdb id
        let mut a = candidate(2, &[]);
        a.popularity = Some(5.0);
        let mut b = candidate(1, &[]);
        b.popularity = Some(5.0);
        let mut c = candidate(3, &[]);
        c.popularity = Some(9.0);

        let scored = score_candidates(
            vec![a, b, c],
            &HashMap::new(),
            &UserSignals::default(),
            unit_weights(),
            20,
        );

        let ids: Vec<i64> = scored.iter().map(|s| s.candidate.tmdb_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_scoring_identical_inputs_identical_output() {
        let signals = UserSignals {
            taste_vector: Some(vec![0.4, 0.6]),
            ..Default::default()
        };
        let mut embeddings = HashMap::new();
        embeddings.insert(1, vec![0.4, 0.6]);
        embeddings.insert(2, vec![0.9, 0.1]);

        let input: Vec<RawCandidate> = vec![
            candidate(1, &["Drama"]),
            candidate(2, &["Action", "Thriller"]),
            candidate(3, &["Comedy"]),
        ];

        let first = score_candidates(input.clone(), &embeddings, &signals, unit_weights(), 20);
        let second = score_candidates(input, &embeddings, &signals, unit_weights(), 20);

        assert_eq!(first, second);
    }
}
