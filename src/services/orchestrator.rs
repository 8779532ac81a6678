use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::{stream, StreamExt};
use uuid::Uuid;

use crate::config::DiscoveryConfig;
use crate::db::store::{plan_candidate_rows, SelectedRef};
use crate::db::{PoolCache, RecommendationStore};
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::models::{
    Evidence, MediaType, PoolSnapshot, RawCandidate, Run, RunCounts, RunStatus, ScoredCandidate,
    SelectionResult,
};
use crate::providers::{CatalogProvider, ProviderAvailability, TasteProfile, VectorStore};
use crate::services::enrichment::{enrich_basic, enrich_full};
use crate::services::evidence::generate_evidence;
use crate::services::merge::{filter_candidates, merge_with_pool, FilterContext};
use crate::services::scoring::{score_candidates, UserSignals};
use crate::services::selection::select_top_n;
use crate::services::sourcing::{fetch_global, fetch_personalized};

/// Embedding lookups issued at once while preparing the scorer input
const EMBEDDING_FETCH_CONCURRENCY: usize = 10;

/// Result of one completed per-user run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub media_type: MediaType,
    pub counts: RunCounts,
    pub per_source_counts: HashMap<String, usize>,
    pub selected: Vec<ScoredCandidate>,
    pub evidence_rows: u64,
    pub duration_ms: i64,
}

/// Result of a preview run: nothing persisted, evidence inlined
#[derive(Debug, Clone)]
pub struct RunPreview {
    pub selected: Vec<ScoredCandidate>,
    pub evidence: Vec<Evidence>,
}

/// Wires the pipeline stages together and brackets them with run lifecycle
///
/// Stage order: sourcing → basic enrichment → merge/filter → scoring →
/// selection → full enrichment (selected only) → evidence → storage.
/// Partial failures inside stages degrade locally; only candidate
/// exhaustion and persistence failures fail the run.
pub struct DiscoveryEngine {
    provider: Arc<dyn CatalogProvider>,
    vectors: Arc<dyn VectorStore>,
    taste: Arc<dyn TasteProfile>,
    store: RecommendationStore,
    pool_cache: PoolCache,
}

impl DiscoveryEngine {
    pub fn new(
        provider: Arc<dyn CatalogProvider>,
        vectors: Arc<dyn VectorStore>,
        taste: Arc<dyn TasteProfile>,
        store: RecommendationStore,
        pool_cache: PoolCache,
    ) -> Self {
        Self {
            provider,
            vectors,
            taste,
            store,
            pool_cache,
        }
    }

    /// Refreshes the shared GLOBAL pools, one snapshot per media type
    ///
    /// Runs once per scheduling cycle; per-user runs read the resulting
    /// snapshots instead of re-triggering global fetches. Basic enrichment
    /// happens here so its cost is amortized across the whole batch window.
    pub async fn refresh_global_pools(&self, config: &DiscoveryConfig) -> DiscoveryResult<Uuid> {
        config.validate()?;

        let started = Instant::now();
        let availability = ProviderAvailability::probe(self.provider.as_ref(), self.vectors.as_ref());

        let run = Run::start(None);
        self.store.create_run(&run).await?;

        let result = self.refresh_pools_inner(config, availability).await;

        match result {
            Ok(counts) => {
                self.store
                    .finalize_run(
                        run.id,
                        RunStatus::Completed,
                        counts,
                        started.elapsed().as_millis() as i64,
                        None,
                    )
                    .await?;
                Ok(run.id)
            }
            Err(e) => {
                self.mark_failed(run.id, started, &e).await;
                Err(e)
            }
        }
    }

    async fn refresh_pools_inner(
        &self,
        config: &DiscoveryConfig,
        availability: ProviderAvailability,
    ) -> DiscoveryResult<RunCounts> {
        // Parallel type-specific paths: identical shape, distinct entities
        let (movies, series) = tokio::join!(
            self.refresh_pool(MediaType::Movie, config, availability),
            self.refresh_pool(MediaType::Series, config, availability),
        );
        let movies = movies?;
        let series = series?;

        Ok(RunCounts {
            total_fetched: movies.total_fetched + series.total_fetched,
            unique_candidates: movies.candidates.len() + series.candidates.len(),
            selected: 0,
        })
    }

    async fn refresh_pool(
        &self,
        media_type: MediaType,
        config: &DiscoveryConfig,
        availability: ProviderAvailability,
    ) -> DiscoveryResult<PoolSnapshot> {
        let sourcing = fetch_global(self.provider.as_ref(), availability, media_type, config).await;
        let enriched = enrich_basic(self.provider.as_ref(), availability, sourcing.candidates).await;

        let snapshot = PoolSnapshot::new(
            media_type,
            enriched,
            sourcing.per_source_counts,
            sourcing.total_fetched,
        );

        // The upsert is atomic per media-type key; concurrent readers see
        // either the previous snapshot or this one
        self.pool_cache.store_snapshot(&snapshot).await?;

        Ok(snapshot)
    }

    /// Runs the full discovery pipeline for one user and media type
    pub async fn run_for_user(
        &self,
        user_id: Uuid,
        media_type: MediaType,
        config: &DiscoveryConfig,
    ) -> DiscoveryResult<RunSummary> {
        config.validate()?;

        let started = Instant::now();
        let availability = ProviderAvailability::probe(self.provider.as_ref(), self.vectors.as_ref());

        let run = Run::start(Some(user_id));
        self.store.create_run(&run).await?;

        tracing::info!(
            run_id = %run.id,
            user_id = %user_id,
            media_type = %media_type,
            "Discovery run started"
        );

        let result = self
            .run_for_user_inner(&run, user_id, media_type, config, availability, started)
            .await;

        match result {
            Ok(summary) => {
                self.store
                    .finalize_run(
                        run.id,
                        RunStatus::Completed,
                        summary.counts,
                        summary.duration_ms,
                        None,
                    )
                    .await?;

                tracing::info!(
                    run_id = %run.id,
                    selected = summary.counts.selected,
                    duration_ms = summary.duration_ms,
                    "Discovery run completed"
                );

                Ok(summary)
            }
            Err(e) => {
                self.mark_failed(run.id, started, &e).await;
                Err(e)
            }
        }
    }

    async fn run_for_user_inner(
        &self,
        run: &Run,
        user_id: Uuid,
        media_type: MediaType,
        config: &DiscoveryConfig,
        availability: ProviderAvailability,
        started: Instant,
    ) -> DiscoveryResult<RunSummary> {
        let (selection, per_source_counts, counts_base, watched_ids) = self
            .assemble_selection(user_id, media_type, config, availability)
            .await?;

        let SelectionResult {
            selected,
            mut ranked,
            selected_indices,
        } = selection;

        // Full enrichment on the selected slice only; write the enriched
        // candidates back into the ranked list so persistence sees them
        let enriched = enrich_full(
            self.provider.as_ref(),
            availability,
            selected.into_iter().map(|s| s.candidate).collect(),
        )
        .await;
        for (&idx, candidate) in selected_indices.iter().zip(enriched) {
            ranked[idx].candidate = candidate;
        }

        let selected_refs: Vec<SelectedRef> = selected_indices
            .iter()
            .enumerate()
            .map(|(pos, &idx)| SelectedRef {
                candidate: &ranked[idx],
                relevance_rank: (idx + 1) as u32,
                selection_rank: (pos + 1) as u32,
            })
            .collect();

        let counts = RunCounts {
            selected: selected_refs.len(),
            ..counts_base
        };

        // Final storage writes; any failure here is fatal for the run
        let rows = plan_candidate_rows(&ranked, &selected_refs);
        self.store.store_candidates(run, &rows).await?;

        let evidence_rows = if availability.embeddings && !watched_ids.is_empty() {
            self.store.store_evidence(run.id, Some(user_id)).await?
        } else {
            0
        };

        let selected: Vec<ScoredCandidate> = selected_indices
            .iter()
            .map(|&idx| ranked[idx].clone())
            .collect();

        Ok(RunSummary {
            run_id: run.id,
            media_type,
            counts,
            per_source_counts,
            selected,
            evidence_rows,
            duration_ms: started.elapsed().as_millis() as i64,
        })
    }

    /// Runs sourcing through selection without touching storage
    ///
    /// Used by the setup flow to test provider settings; evidence comes
    /// from the vector store directly instead of the persistence path.
    pub async fn preview_for_user(
        &self,
        user_id: Uuid,
        media_type: MediaType,
        config: &DiscoveryConfig,
    ) -> DiscoveryResult<RunPreview> {
        config.validate()?;

        let availability = ProviderAvailability::probe(self.provider.as_ref(), self.vectors.as_ref());

        let (selection, _, _, watched_ids) = self
            .assemble_selection(user_id, media_type, config, availability)
            .await?;

        let evidence = generate_evidence(
            self.vectors.as_ref(),
            availability,
            media_type,
            &selection.selected,
            &watched_ids,
        )
        .await;

        Ok(RunPreview {
            selected: selection.selected,
            evidence,
        })
    }

    /// Sourcing → basic enrichment → merge/filter → scoring → selection
    async fn assemble_selection(
        &self,
        user_id: Uuid,
        media_type: MediaType,
        config: &DiscoveryConfig,
        availability: ProviderAvailability,
    ) -> DiscoveryResult<(SelectionResult, HashMap<String, usize>, RunCounts, HashSet<i64>)> {
        // Readers tolerate a missing or mid-refresh pool; a stale snapshot
        // still beats re-triggering the global fetch per user
        let pool = match self.pool_cache.get_snapshot(media_type).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => PoolSnapshot::empty(media_type),
            Err(e) => {
                tracing::warn!(error = %e, "Pool snapshot read failed, using empty pool");
                PoolSnapshot::empty(media_type)
            }
        };

        let personalized = fetch_personalized(
            self.provider.as_ref(),
            self.taste.as_ref(),
            availability,
            user_id,
            media_type,
            config,
        )
        .await;

        let mut per_source_counts = pool.per_source_counts.clone();
        per_source_counts.extend(personalized.per_source_counts.clone());
        let counts_base = RunCounts {
            total_fetched: personalized.total_fetched + pool.total_fetched,
            unique_candidates: 0,
            selected: 0,
        };

        // Pool entries were enriched at refresh time; only the ephemeral
        // personalized candidates need the basic tier here
        let personalized_candidates = enrich_basic(
            self.provider.as_ref(),
            availability,
            personalized.candidates,
        )
        .await;

        let merged = merge_with_pool(personalized_candidates, &pool.candidates);
        let counts_base = RunCounts {
            unique_candidates: merged.len(),
            ..counts_base
        };

        let (filter_ctx, signals, watched_ids) =
            self.gather_user_state(user_id, media_type, config).await;

        let filtered = filter_candidates(merged, &filter_ctx);
        if filtered.candidates.is_empty() {
            return Err(DiscoveryError::NoCandidates(format!(
                "no {} candidates remained after merge and filtering",
                media_type
            )));
        }

        let embeddings = if availability.embeddings && signals.taste_vector.is_some() {
            self.fetch_embeddings(media_type, &filtered.candidates).await
        } else {
            HashMap::new()
        };

        let scored = score_candidates(
            filtered.candidates,
            &embeddings,
            &signals,
            config.weights_for(media_type),
            config.min_vote_count,
        );

        let selection = select_top_n(scored, config.selected_count, config.lookahead_window);

        Ok((selection, per_source_counts, counts_base, watched_ids))
    }

    /// Filter context and scoring signals, each degrading to empty on a
    /// collaborator failure rather than failing the run
    async fn gather_user_state(
        &self,
        user_id: Uuid,
        media_type: MediaType,
        config: &DiscoveryConfig,
    ) -> (FilterContext, UserSignals, HashSet<i64>) {
        let (library, watched, disliked, policy, taste_vector, genre_history, recent) = tokio::join!(
            self.taste.library_ids(media_type),
            self.taste.watched_ids(user_id, media_type),
            self.taste.disliked_ids(user_id, media_type),
            self.taste.dislike_policy(user_id),
            self.taste.taste_vector(user_id, media_type),
            self.taste.genre_history(user_id, media_type),
            self.taste.recently_recommended(user_id, media_type),
        );

        let watched_ids = or_default(watched, "watched_ids");
        let filter_ctx = FilterContext {
            library_ids: or_default(library, "library_ids"),
            watched_ids: watched_ids.clone(),
            disliked_ids: or_default(disliked, "disliked_ids"),
            dislike_policy: or_default(policy, "dislike_policy").or(Some(config.dislike_policy)),
            reduce_factor: config.reduce_factor,
        };

        let signals = UserSignals {
            taste_vector: or_default(taste_vector, "taste_vector"),
            genre_history: or_default(genre_history, "genre_history"),
            recently_recommended: or_default(recent, "recently_recommended"),
        };

        (filter_ctx, signals, watched_ids)
    }

    async fn fetch_embeddings(
        &self,
        media_type: MediaType,
        candidates: &[RawCandidate],
    ) -> HashMap<i64, Vec<f32>> {
        let vectors = self.vectors.as_ref();
        stream::iter(candidates.iter().map(|c| async move {
            match vectors.embedding_for(media_type, c.tmdb_id).await {
                Ok(Some(embedding)) => Some((c.tmdb_id, embedding)),
                Ok(None) => None,
                Err(e) => {
                    tracing::debug!(tmdb_id = c.tmdb_id, error = %e, "Embedding lookup failed");
                    None
                }
            }
        }))
        .buffer_unordered(EMBEDDING_FETCH_CONCURRENCY)
        .filter_map(|entry| async move { entry })
        .collect()
        .await
    }

    /// Marks a run failed with a readable message, exactly once
    async fn mark_failed(&self, run_id: Uuid, started: Instant, error: &DiscoveryError) {
        tracing::error!(run_id = %run_id, error = %error, "Discovery run failed");

        if let Err(finalize_err) = self
            .store
            .finalize_run(
                run_id,
                RunStatus::Failed,
                RunCounts::default(),
                started.elapsed().as_millis() as i64,
                Some(&error.to_string()),
            )
            .await
        {
            tracing::error!(
                run_id = %run_id,
                error = %finalize_err,
                "Failed to record run failure"
            );
        }
    }
}

fn or_default<T: Default>(result: DiscoveryResult<T>, what: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "{} lookup failed, using default", what);
            T::default()
        }
    }
}
