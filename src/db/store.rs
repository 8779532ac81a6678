use std::collections::{HashMap, HashSet};

use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::error::DiscoveryResult;
use crate::models::{Run, RunCounts, RunStatus, ScoredCandidate};

/// Ranked candidates persisted per run, beyond which only selected items are kept
const PERSIST_TOP_N: usize = 100;

/// A selected candidate with its two ranks
///
/// Selection rank (1..N, the order the selector picked) is distinct from
/// relevance rank (position in the score-sorted list).
#[derive(Debug, Clone)]
pub struct SelectedRef<'a> {
    pub candidate: &'a ScoredCandidate,
    pub relevance_rank: u32,
    pub selection_rank: u32,
}

/// One row of the bulk candidate write
#[derive(Debug, Clone)]
pub struct CandidateRow<'a> {
    pub scored: &'a ScoredCandidate,
    pub relevance_rank: u32,
    pub selection_rank: Option<u32>,
}

/// Decides which candidate rows a run persists
///
/// The top `PERSIST_TOP_N` ranked candidates are always kept; selected
/// candidates ranked beyond that are appended rather than dropped, so the
/// persisted set is a union, never a truncation of the selection.
pub fn plan_candidate_rows<'a>(
    all: &'a [ScoredCandidate],
    selected: &[SelectedRef<'a>],
) -> Vec<CandidateRow<'a>> {
    let selection_ranks: HashMap<i64, u32> = selected
        .iter()
        .map(|s| (s.candidate.candidate.tmdb_id, s.selection_rank))
        .collect();

    let mut included: HashSet<i64> = HashSet::new();
    let mut rows = Vec::new();

    for (i, scored) in all.iter().take(PERSIST_TOP_N).enumerate() {
        included.insert(scored.candidate.tmdb_id);
        rows.push(CandidateRow {
            scored,
            relevance_rank: (i + 1) as u32,
            selection_rank: selection_ranks.get(&scored.candidate.tmdb_id).copied(),
        });
    }

    for sel in selected {
        if !included.insert(sel.candidate.candidate.tmdb_id) {
            continue;
        }
        rows.push(CandidateRow {
            scored: sel.candidate,
            relevance_rank: sel.relevance_rank,
            selection_rank: Some(sel.selection_rank),
        });
    }

    rows
}

/// Persistence collaborator for ranked candidates, evidence, and run records
#[derive(Clone)]
pub struct RecommendationStore {
    pool: PgPool,
}

impl RecommendationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the run record at pipeline start
    pub async fn create_run(&self, run: &Run) -> DiscoveryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO discovery_runs (id, user_id, status, started_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(run.id)
        .bind(run.user_id)
        .bind(run.status.as_str())
        .bind(run.started_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Finalizes a run exactly once
    ///
    /// The status guard makes a second finalize a no-op instead of an
    /// overwrite; that case is logged and reported as false.
    pub async fn finalize_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        counts: RunCounts,
        duration_ms: i64,
        error: Option<&str>,
    ) -> DiscoveryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE discovery_runs
            SET status = $2,
                total_fetched = $3,
                unique_candidates = $4,
                selected_count = $5,
                finished_at = now(),
                duration_ms = $6,
                error = $7
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(counts.total_fetched as i64)
        .bind(counts.unique_candidates as i64)
        .bind(counts.selected as i64)
        .bind(duration_ms)
        .bind(error)
        .execute(&self.pool)
        .await?;

        let finalized = result.rows_affected() == 1;
        if !finalized {
            tracing::warn!(run_id = %run_id, "Run was already finalized");
        }

        Ok(finalized)
    }

    /// Persists the planned candidate rows as one bulk write
    ///
    /// Superseded rows from the same user scope (or the global scope for
    /// runs without a user) are removed in the same transaction, so readers
    /// see either the previous result set or the new one — replace on
    /// success, never clear-then-fail.
    pub async fn store_candidates(
        &self,
        run: &Run,
        rows: &[CandidateRow<'_>],
    ) -> DiscoveryResult<()> {
        let mut tx = self.pool.begin().await?;

        // Drop candidates of earlier runs in this scope; run records stay as history
        sqlx::query(
            r#"
            DELETE FROM recommendation_candidates c
            USING discovery_runs r
            WHERE c.run_id = r.id
              AND r.id <> $1
              AND r.user_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(run.id)
        .bind(run.user_id)
        .execute(&mut *tx)
        .await?;

        if !rows.is_empty() {
            let mut builder = QueryBuilder::new(
                "INSERT INTO recommendation_candidates (\
                 run_id, user_id, media_type, tmdb_id, imdb_id, title, release_year, \
                 language, overview, poster_path, backdrop_path, genres, vote_average, \
                 vote_count, popularity, source, seed_tmdb_id, runtime_minutes, tagline, \
                 cast_json, directors, similarity, novelty, rating, diversity, \
                 final_score, relevance_rank, selected, selection_rank) ",
            );

            builder.push_values(rows.iter(), |mut b, row| {
                let c = &row.scored.candidate;
                let cast_json = serde_json::to_string(&c.cast).unwrap_or_else(|_| "[]".to_string());

                b.push_bind(run.id)
                    .push_bind(run.user_id)
                    .push_bind(c.media_type.to_string())
                    .push_bind(c.tmdb_id)
                    .push_bind(c.imdb_id.clone())
                    .push_bind(c.title.clone())
                    .push_bind(c.release_year)
                    .push_bind(c.language.clone())
                    .push_bind(c.overview.clone())
                    .push_bind(c.poster_path.clone())
                    .push_bind(c.backdrop_path.clone())
                    .push_bind(c.genres.clone())
                    .push_bind(c.vote_average)
                    .push_bind(c.vote_count.map(|v| v as i32))
                    .push_bind(c.popularity)
                    .push_bind(c.source.to_string())
                    .push_bind(c.seed_tmdb_id)
                    .push_bind(c.runtime_minutes.map(|r| r as i32))
                    .push_bind(c.tagline.clone())
                    .push_bind(cast_json)
                    .push_bind(c.directors.clone())
                    .push_bind(row.scored.similarity)
                    .push_bind(row.scored.novelty)
                    .push_bind(row.scored.rating)
                    .push_bind(row.scored.diversity)
                    .push_bind(row.scored.final_score)
                    .push_bind(row.relevance_rank as i32)
                    .push_bind(row.selection_rank.is_some())
                    .push_bind(row.selection_rank.map(|r| r as i32));
            });

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        tracing::info!(
            run_id = %run.id,
            rows = rows.len(),
            "Stored candidate rows"
        );

        Ok(())
    }

    /// Persists evidence for every selected candidate of a run in one pass
    ///
    /// A single query computes each selected candidate's top-3 nearest
    /// watched neighbors server-side, so no per-candidate vector
    /// round-trips happen. Global runs have no watched set and store no
    /// evidence.
    pub async fn store_evidence(
        &self,
        run_id: Uuid,
        user_id: Option<Uuid>,
    ) -> DiscoveryResult<u64> {
        let Some(user_id) = user_id else {
            return Ok(0);
        };

        let result = sqlx::query(
            r#"
            INSERT INTO recommendation_evidence (candidate_id, watched_tmdb_id, similarity, evidence_type)
            SELECT c.id,
                   n.tmdb_id,
                   n.similarity,
                   CASE
                       WHEN n.is_favorite THEN 'favorite'
                       WHEN n.play_count > 1 THEN 'highly_rated'
                       ELSE 'watched'
                   END
            FROM recommendation_candidates c
            JOIN media_embeddings e
              ON e.media_type = c.media_type AND e.tmdb_id = c.tmdb_id
            CROSS JOIN LATERAL (
                SELECT w.tmdb_id,
                       w.is_favorite,
                       w.play_count,
                       1 - (w.embedding <=> e.embedding) AS similarity
                FROM watched_items w
                WHERE w.user_id = $2
                  AND w.media_type = c.media_type
                  AND w.embedding IS NOT NULL
                ORDER BY w.embedding <=> e.embedding
                LIMIT 3
            ) n
            WHERE c.run_id = $1 AND c.selected
            "#,
        )
        .bind(run_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            run_id = %run_id,
            evidence_rows = result.rows_affected(),
            "Stored evidence rows"
        );

        Ok(result.rows_affected())
    }

    /// Removes one user's recommendations and taste profile
    ///
    /// Deletes respect dependency order (evidence → candidates → runs →
    /// taste profile) inside one transaction.
    pub async fn clear_user_recommendations(&self, user_id: Uuid) -> DiscoveryResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM recommendation_evidence e
            USING recommendation_candidates c, discovery_runs r
            WHERE e.candidate_id = c.id AND c.run_id = r.id AND r.user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM recommendation_candidates c
            USING discovery_runs r
            WHERE c.run_id = r.id AND r.user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM discovery_runs WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM taste_profiles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, "Cleared user recommendations");

        Ok(())
    }

    /// Removes all recommendation data, global pools included
    pub async fn clear_all_recommendations(&self) -> DiscoveryResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recommendation_evidence")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM recommendation_candidates")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM discovery_runs")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM taste_profiles")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!("Cleared all recommendations");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateSource, MediaType, RawCandidate};

    fn scored(tmdb_id: i64, final_score: f32) -> ScoredCandidate {
        ScoredCandidate {
            candidate: RawCandidate::new(
                tmdb_id,
                MediaType::Movie,
                &format!("Title {}", tmdb_id),
                CandidateSource::Discover,
            ),
            similarity: 0.5,
            novelty: 0.5,
            rating: 0.5,
            diversity: 0.5,
            final_score,
        }
    }

    fn ranked_list(n: usize) -> Vec<ScoredCandidate> {
        (0..n).map(|i| scored(i as i64 + 1, 1.0 - i as f32 * 0.001)).collect()
    }

    #[test]
    fn test_plan_caps_at_top_100_with_selected_inside() {
        // Scenario: 120 candidates, 5 selected inside the top 100
        let all = ranked_list(120);
        let selected: Vec<SelectedRef> = (0..5)
            .map(|i| SelectedRef {
                candidate: &all[i],
                relevance_rank: (i + 1) as u32,
                selection_rank: (i + 1) as u32,
            })
            .collect();

        let rows = plan_candidate_rows(&all, &selected);

        assert_eq!(rows.len(), 100);
        assert_eq!(rows.iter().filter(|r| r.selection_rank.is_some()).count(), 5);
    }

    #[test]
    fn test_plan_appends_selected_beyond_cap() {
        // Scenario: 50 persistable candidates plus one selected ranked 200
        let all = ranked_list(50);
        let outlier = scored(9999, 0.1);
        let selected = vec![SelectedRef {
            candidate: &outlier,
            relevance_rank: 200,
            selection_rank: 1,
        }];

        let rows = plan_candidate_rows(&all, &selected);

        assert_eq!(rows.len(), 51);
        let appended = rows.last().unwrap();
        assert_eq!(appended.scored.candidate.tmdb_id, 9999);
        assert_eq!(appended.relevance_rank, 200);
        assert_eq!(appended.selection_rank, Some(1));
    }

    #[test]
    fn test_plan_keeps_all_when_under_cap() {
        let all = ranked_list(30);
        let rows = plan_candidate_rows(&all, &[]);
        assert_eq!(rows.len(), 30);
        assert_eq!(rows[0].relevance_rank, 1);
        assert_eq!(rows[29].relevance_rank, 30);
        assert!(rows.iter().all(|r| r.selection_rank.is_none()));
    }

    #[test]
    fn test_plan_never_duplicates_selected_rows() {
        let all = ranked_list(150);
        // Selected at rank 150, beyond the cap, listed once
        let selected = vec![SelectedRef {
            candidate: &all[149],
            relevance_rank: 150,
            selection_rank: 1,
        }];

        let rows = plan_candidate_rows(&all, &selected);

        assert_eq!(rows.len(), 101);
        let ids: HashSet<i64> = rows.iter().map(|r| r.scored.candidate.tmdb_id).collect();
        assert_eq!(ids.len(), rows.len());
    }

    #[test]
    fn test_plan_selection_rank_is_distinct_from_relevance_rank() {
        let all = ranked_list(10);
        // The selector picked rank-3 first and rank-1 second
        let selected = vec![
            SelectedRef {
                candidate: &all[2],
                relevance_rank: 3,
                selection_rank: 1,
            },
            SelectedRef {
                candidate: &all[0],
                relevance_rank: 1,
                selection_rank: 2,
            },
        ];

        let rows = plan_candidate_rows(&all, &selected);

        assert_eq!(rows[2].selection_rank, Some(1));
        assert_eq!(rows[0].selection_rank, Some(2));
    }
}
