use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::{stream, StreamExt};
use uuid::Uuid;

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryResult;
use crate::models::{MediaType, RawCandidate};
use crate::providers::{CatalogProvider, ProviderAvailability, TasteProfile};

/// How many seeds fetch their feeds at once
const SEED_FETCH_CONCURRENCY: usize = 5;

/// Outcome of global candidate sourcing for one media type
#[derive(Debug, Clone)]
pub struct GlobalSourcing {
    pub candidates: Vec<RawCandidate>,
    pub per_source_counts: HashMap<String, usize>,
    pub total_fetched: usize,
    pub unique_count: usize,
}

/// Outcome of personalized candidate sourcing for one user and media type
#[derive(Debug, Clone)]
pub struct PersonalizedSourcing {
    pub candidates: Vec<RawCandidate>,
    pub per_source_counts: HashMap<String, usize>,
    pub total_fetched: usize,
}

/// Fetches the shared GLOBAL candidate pool for one media type
///
/// Sources run in priority order discover > trending > popular; the
/// concatenation is deduplicated by tmdb id with first occurrence winning.
/// A failing source is logged and contributes zero candidates; an
/// unconfigured provider skips all sources silently.
pub async fn fetch_global(
    provider: &dyn CatalogProvider,
    availability: ProviderAvailability,
    media_type: MediaType,
    config: &DiscoveryConfig,
) -> GlobalSourcing {
    let mut per_source_counts = HashMap::new();

    let (discover, trending, popular) = if availability.catalog {
        tokio::join!(
            fetch_discover_pages(provider, media_type, config),
            checked_source(provider.name(), "trending", async {
                provider.fetch_trending(media_type, config.max_per_source).await
            }),
            checked_source(provider.name(), "popular", async {
                provider.fetch_popular(media_type, config.max_per_source).await
            }),
        )
    } else {
        tracing::debug!(media_type = %media_type, "Catalog provider unconfigured, skipping global sources");
        (Vec::new(), Vec::new(), Vec::new())
    };

    per_source_counts.insert("discover".to_string(), discover.len());
    per_source_counts.insert("trending".to_string(), trending.len());
    per_source_counts.insert("popular".to_string(), popular.len());
    let total_fetched = discover.len() + trending.len() + popular.len();

    let mut candidates = discover;
    candidates.extend(trending);
    candidates.extend(popular);
    let candidates = dedup_by_tmdb_id(candidates);
    let unique_count = candidates.len();

    tracing::info!(
        media_type = %media_type,
        total_fetched,
        unique = unique_count,
        "Global sourcing completed"
    );

    GlobalSourcing {
        candidates,
        per_source_counts,
        total_fetched,
        unique_count,
    }
}

/// Fetches the PERSONALIZED candidate pool for one user and media type
///
/// Seeds are the user's most recently engaged items plus their highest
/// rated ones; the personalized budget is divided evenly across seeds. The
/// per-user catalog feed is attempted only when a linked token exists.
pub async fn fetch_personalized(
    provider: &dyn CatalogProvider,
    taste: &dyn TasteProfile,
    availability: ProviderAvailability,
    user_id: Uuid,
    media_type: MediaType,
    config: &DiscoveryConfig,
) -> PersonalizedSourcing {
    let mut per_source_counts = HashMap::new();
    per_source_counts.insert("recommended".to_string(), 0);
    per_source_counts.insert("similar".to_string(), 0);
    per_source_counts.insert("user_feed".to_string(), 0);

    if !availability.catalog {
        tracing::debug!(user_id = %user_id, "Catalog provider unconfigured, skipping personalized sources");
        return PersonalizedSourcing {
            candidates: Vec::new(),
            per_source_counts,
            total_fetched: 0,
        };
    }

    let seeds = gather_seeds(taste, user_id, media_type, config).await;

    let mut candidates = Vec::new();
    if !seeds.is_empty() {
        let per_seed_budget = (config.max_personalized / seeds.len()).max(1);

        // Bounded fan-out over seeds; `buffered` keeps seed order so the
        // downstream first-wins dedup stays deterministic
        let seed_results: Vec<(Vec<RawCandidate>, Vec<RawCandidate>)> =
            stream::iter(seeds.iter().map(|&seed| {
                fetch_for_seed(provider, media_type, seed, per_seed_budget)
            }))
            .buffered(SEED_FETCH_CONCURRENCY)
            .collect()
            .await;

        for (recommended, similar) in seed_results {
            *per_source_counts.get_mut("recommended").unwrap() += recommended.len();
            *per_source_counts.get_mut("similar").unwrap() += similar.len();
            candidates.extend(recommended);
            candidates.extend(similar);
        }
    }

    // Third personalized feed, only with linked per-user credentials
    match taste.user_feed_token(user_id).await {
        Ok(Some(token)) => {
            let feed = checked_source(provider.name(), "user_feed", async {
                provider
                    .fetch_user_feed(media_type, &token, config.max_personalized)
                    .await
            })
            .await;
            *per_source_counts.get_mut("user_feed").unwrap() = feed.len();
            candidates.extend(feed);
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "User feed token lookup failed");
        }
    }

    let total_fetched: usize = per_source_counts.values().sum();
    let candidates = dedup_by_tmdb_id(candidates);

    tracing::info!(
        user_id = %user_id,
        media_type = %media_type,
        total_fetched,
        unique = candidates.len(),
        "Personalized sourcing completed"
    );

    PersonalizedSourcing {
        candidates,
        per_source_counts,
        total_fetched,
    }
}

/// Seed ids: recently engaged first, then top rated, deduplicated
async fn gather_seeds(
    taste: &dyn TasteProfile,
    user_id: Uuid,
    media_type: MediaType,
    config: &DiscoveryConfig,
) -> Vec<i64> {
    let recent = match taste.recent_engagements(user_id, media_type, config.seed_count).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Recent engagement lookup failed");
            Vec::new()
        }
    };

    let top_rated = match taste
        .top_rated(user_id, media_type, config.seed_rating_threshold, config.seed_count)
        .await
    {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Top rated lookup failed");
            Vec::new()
        }
    };

    let mut seen = HashSet::new();
    recent
        .into_iter()
        .chain(top_rated)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Recommended items for one seed, topped up with similar items when the
/// recommendation feed comes back short of the seed budget
async fn fetch_for_seed(
    provider: &dyn CatalogProvider,
    media_type: MediaType,
    seed: i64,
    budget: usize,
) -> (Vec<RawCandidate>, Vec<RawCandidate>) {
    let recommended = checked_source(provider.name(), "recommended", async {
        provider
            .fetch_recommendations_for(media_type, seed, budget)
            .await
    })
    .await;

    let remaining = budget.saturating_sub(recommended.len());
    let similar = if remaining > 0 {
        checked_source(provider.name(), "similar", async {
            provider.fetch_similar_to(media_type, seed, remaining).await
        })
        .await
    } else {
        Vec::new()
    };

    (recommended, similar)
}

/// Sequential discover paging with a fixed inter-page delay
///
/// Stops early on an empty page or once the per-source target is reached.
/// Any page failure degrades the whole source to zero candidates.
async fn fetch_discover_pages(
    provider: &dyn CatalogProvider,
    media_type: MediaType,
    config: &DiscoveryConfig,
) -> Vec<RawCandidate> {
    let result: DiscoveryResult<Vec<RawCandidate>> = async {
        let mut collected = Vec::new();
        for page in 1..=config.max_discover_pages {
            if page > 1 && config.discover_page_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(config.discover_page_delay_ms)).await;
            }

            let batch = provider.fetch_discover(media_type, page).await?;
            if batch.is_empty() {
                break;
            }

            collected.extend(batch);
            if collected.len() >= config.max_per_source {
                collected.truncate(config.max_per_source);
                break;
            }
        }
        Ok(collected)
    }
    .await;

    match result {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::warn!(
                provider = provider.name(),
                source = "discover",
                media_type = %media_type,
                error = %e,
                "Source failed, continuing with zero candidates"
            );
            Vec::new()
        }
    }
}

/// Runs one source fetch, degrading any failure to zero candidates
async fn checked_source(
    provider_name: &str,
    source: &str,
    fetch: impl std::future::Future<Output = DiscoveryResult<Vec<RawCandidate>>>,
) -> Vec<RawCandidate> {
    match fetch.await {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::warn!(
                provider = provider_name,
                source,
                error = %e,
                "Source failed, continuing with zero candidates"
            );
            Vec::new()
        }
    }
}

/// Deduplicates by tmdb id, first occurrence winning
pub fn dedup_by_tmdb_id(candidates: Vec<RawCandidate>) -> Vec<RawCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.tmdb_id))
        .collect()
}
