use futures::{stream, StreamExt};

use crate::models::RawCandidate;
use crate::providers::{CatalogProvider, ProviderAvailability};

/// Basic enrichment issues one fetch per candidate
const BASIC_CONCURRENCY: usize = 10;
/// Full enrichment issues two dependent fetches per candidate, so it runs
/// at lower concurrency
const FULL_CONCURRENCY: usize = 5;

/// Basic enrichment tier: poster, backdrop, language, overview
///
/// Touches only candidates missing a poster or language. Merge is
/// fill-the-gaps; a failed fetch is logged and the candidate passes
/// through partially enriched. Candidate order is preserved.
pub async fn enrich_basic(
    provider: &dyn CatalogProvider,
    availability: ProviderAvailability,
    candidates: Vec<RawCandidate>,
) -> Vec<RawCandidate> {
    if !availability.catalog {
        return candidates;
    }

    let needing = candidates.iter().filter(|c| c.needs_basic_enrichment()).count();
    if needing == 0 {
        return candidates;
    }

    let enriched: Vec<RawCandidate> = stream::iter(candidates.into_iter().map(|mut c| async move {
        if !c.needs_basic_enrichment() {
            return c;
        }

        match provider.fetch_details(c.media_type, c.tmdb_id).await {
            Ok(details) => c.fill_missing_from(&details),
            Err(e) => {
                tracing::debug!(
                    tmdb_id = c.tmdb_id,
                    error = %e,
                    "Basic enrichment fetch failed, keeping candidate partial"
                );
            }
        }

        c
    }))
    .buffered(BASIC_CONCURRENCY)
    .collect()
    .await;

    tracing::info!(candidates = enriched.len(), needing, "Basic enrichment completed");

    enriched
}

/// Full enrichment tier: imdb id, cast, directors, runtime, tagline
///
/// Runs only on selected candidates, bounding the two dependent fetches per
/// candidate to O(selected) rather than O(all candidates).
pub async fn enrich_full(
    provider: &dyn CatalogProvider,
    availability: ProviderAvailability,
    candidates: Vec<RawCandidate>,
) -> Vec<RawCandidate> {
    if !availability.catalog {
        return candidates;
    }

    let enriched: Vec<RawCandidate> = stream::iter(candidates.into_iter().map(|mut c| async move {
        if !c.needs_full_enrichment() {
            return c;
        }

        match provider.fetch_details(c.media_type, c.tmdb_id).await {
            Ok(details) => c.fill_missing_from(&details),
            Err(e) => {
                tracing::debug!(
                    tmdb_id = c.tmdb_id,
                    error = %e,
                    "Full enrichment details fetch failed"
                );
            }
        }

        if c.cast.is_empty() || c.directors.is_empty() {
            match provider.fetch_credits(c.media_type, c.tmdb_id).await {
                Ok(credits) => {
                    if c.cast.is_empty() {
                        c.cast = credits.cast;
                    }
                    if c.directors.is_empty() {
                        c.directors = credits.directors;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        tmdb_id = c.tmdb_id,
                        error = %e,
                        "Full enrichment credits fetch failed"
                    );
                }
            }
        }

        c
    }))
    .buffered(FULL_CONCURRENCY)
    .collect()
    .await;

    tracing::info!(candidates = enriched.len(), "Full enrichment completed");

    enriched
}
