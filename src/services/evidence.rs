use std::collections::HashSet;

use futures::{stream, StreamExt};

use crate::models::{Evidence, MediaType, ScoredCandidate};
use crate::providers::{ProviderAvailability, VectorStore};

/// Maximum evidence entries per selected candidate
const EVIDENCE_PER_CANDIDATE: usize = 3;

/// How many candidates query the vector store at once
const EVIDENCE_CONCURRENCY: usize = 5;

/// Generates watched-item evidence for each selected candidate
///
/// Evidence is best-effort: with no embedded watch history or no embedding
/// model configured, the result is simply empty. A per-candidate lookup
/// failure is logged and that candidate goes without evidence.
pub async fn generate_evidence(
    vectors: &dyn VectorStore,
    availability: ProviderAvailability,
    media_type: MediaType,
    selected: &[ScoredCandidate],
    watched_ids: &HashSet<i64>,
) -> Vec<Evidence> {
    if !availability.embeddings || watched_ids.is_empty() {
        tracing::debug!(
            embeddings = availability.embeddings,
            watched = watched_ids.len(),
            "Skipping evidence generation"
        );
        return Vec::new();
    }

    let per_candidate: Vec<Vec<Evidence>> =
        stream::iter(selected.iter().map(|scored| async move {
            let tmdb_id = scored.candidate.tmdb_id;
            match vectors
                .nearest_watched(media_type, tmdb_id, watched_ids, EVIDENCE_PER_CANDIDATE)
                .await
            {
                Ok(neighbors) => neighbors
                    .iter()
                    .take(EVIDENCE_PER_CANDIDATE)
                    .map(|n| Evidence::from_neighbor(tmdb_id, n))
                    .collect(),
                Err(e) => {
                    tracing::debug!(
                        tmdb_id,
                        error = %e,
                        "Evidence lookup failed, candidate goes without evidence"
                    );
                    Vec::new()
                }
            }
        }))
        .buffered(EVIDENCE_CONCURRENCY)
        .collect()
        .await;

    let evidence: Vec<Evidence> = per_candidate.into_iter().flatten().collect();

    tracing::info!(
        selected = selected.len(),
        evidence_rows = evidence.len(),
        "Evidence generation completed"
    );

    evidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiscoveryError;
    use crate::models::{CandidateSource, EvidenceType, RawCandidate, WatchedNeighbor};
    use crate::providers::MockVectorStore;

    fn scored(tmdb_id: i64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: RawCandidate::new(
                tmdb_id,
                MediaType::Movie,
                &format!("Title {}", tmdb_id),
                CandidateSource::Recommended,
            ),
            similarity: 0.5,
            novelty: 0.5,
            rating: 0.5,
            diversity: 0.5,
            final_score: 0.5,
        }
    }

    fn neighbor(tmdb_id: i64, is_favorite: bool, play_count: u32) -> WatchedNeighbor {
        WatchedNeighbor {
            tmdb_id,
            similarity: 0.9,
            is_favorite,
            play_count,
        }
    }

    fn availability(embeddings: bool) -> ProviderAvailability {
        ProviderAvailability {
            catalog: true,
            embeddings,
        }
    }

    #[tokio::test]
    async fn test_evidence_capped_at_three_per_candidate() {
        let mut vectors = MockVectorStore::new();
        vectors.expect_nearest_watched().returning(|_, _, _, _| {
            // A misbehaving store returning more than asked for
            Ok((0..5).map(|i| neighbor(i, false, 1)).collect())
        });

        let watched: HashSet<i64> = (0..5).collect();
        let evidence = generate_evidence(
            &vectors,
            availability(true),
            MediaType::Movie,
            &[scored(550)],
            &watched,
        )
        .await;

        assert_eq!(evidence.len(), 3);
        assert!(evidence.iter().all(|e| e.candidate_tmdb_id == 550));
    }

    #[tokio::test]
    async fn test_no_watch_history_means_no_evidence() {
        let vectors = MockVectorStore::new();

        let evidence = generate_evidence(
            &vectors,
            availability(true),
            MediaType::Movie,
            &[scored(550)],
            &HashSet::new(),
        )
        .await;

        assert!(evidence.is_empty());
    }

    #[tokio::test]
    async fn test_no_embedding_model_means_no_evidence() {
        let vectors = MockVectorStore::new();
        let watched: HashSet<i64> = HashSet::from([603]);

        let evidence = generate_evidence(
            &vectors,
            availability(false),
            MediaType::Movie,
            &[scored(550)],
            &watched,
        )
        .await;

        assert!(evidence.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_skips_candidate_only() {
        let mut vectors = MockVectorStore::new();
        vectors
            .expect_nearest_watched()
            .returning(|_, candidate_id, _, _| {
                if candidate_id == 1 {
                    Err(DiscoveryError::Provider("index offline".to_string()))
                } else {
                    Ok(vec![neighbor(603, true, 1)])
                }
            });

        let watched: HashSet<i64> = HashSet::from([603]);
        let evidence = generate_evidence(
            &vectors,
            availability(true),
            MediaType::Movie,
            &[scored(1), scored(2)],
            &watched,
        )
        .await;

        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].candidate_tmdb_id, 2);
        assert_eq!(evidence[0].evidence_type, EvidenceType::Favorite);
    }
}
