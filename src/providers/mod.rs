/// External collaborator contracts consumed by the discovery core
///
/// The pipeline never talks to third-party catalogs, the embedding store, or
/// the user's library directly; it goes through these traits. Concrete
/// implementations live beside them (`tmdb`) or in the host application.
use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::config::DislikePolicy;
use crate::error::DiscoveryResult;
use crate::models::{CastMember, MediaType, RawCandidate, WatchedNeighbor};

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// Cast and crew returned by a credits lookup
#[derive(Debug, Clone, Default)]
pub struct Credits {
    /// Top-billed cast, already capped at ten entries
    pub cast: Vec<CastMember>,
    /// Deduplicated director (movies) or creator (series) names
    pub directors: Vec<String>,
}

/// Catalog provider abstraction
///
/// One provider serves both global feeds (trending, popular, discover) and
/// seed-driven personalized feeds. Every method takes the media type so
/// movie and series paths stay separate while sharing one code path.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Trending titles for the current window
    async fn fetch_trending(
        &self,
        media_type: MediaType,
        limit: usize,
    ) -> DiscoveryResult<Vec<RawCandidate>>;

    /// All-time popular titles
    async fn fetch_popular(
        &self,
        media_type: MediaType,
        limit: usize,
    ) -> DiscoveryResult<Vec<RawCandidate>>;

    /// One page of the discover feed, ordered by popularity
    async fn fetch_discover(
        &self,
        media_type: MediaType,
        page: u32,
    ) -> DiscoveryResult<Vec<RawCandidate>>;

    /// Titles the catalog recommends given a seed title
    async fn fetch_recommendations_for(
        &self,
        media_type: MediaType,
        seed_tmdb_id: i64,
        limit: usize,
    ) -> DiscoveryResult<Vec<RawCandidate>>;

    /// Titles similar to a seed title
    async fn fetch_similar_to(
        &self,
        media_type: MediaType,
        seed_tmdb_id: i64,
        limit: usize,
    ) -> DiscoveryResult<Vec<RawCandidate>>;

    /// Full details for one title (enrichment)
    async fn fetch_details(
        &self,
        media_type: MediaType,
        tmdb_id: i64,
    ) -> DiscoveryResult<RawCandidate>;

    /// Cast and crew for one title (full enrichment)
    async fn fetch_credits(&self, media_type: MediaType, tmdb_id: i64)
        -> DiscoveryResult<Credits>;

    /// The user's own catalog feed; requires a linked per-user token
    async fn fetch_user_feed(
        &self,
        media_type: MediaType,
        token: &str,
        limit: usize,
    ) -> DiscoveryResult<Vec<RawCandidate>>;

    /// Whether the provider has credentials and can be called at all
    fn is_configured(&self) -> bool;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Embedding/nearest-neighbor store abstraction
///
/// The vector computation itself is delegated here; the pipeline only
/// consumes similarities and neighbor lists.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Content embedding for a title, if one has been computed
    async fn embedding_for(
        &self,
        media_type: MediaType,
        tmdb_id: i64,
    ) -> DiscoveryResult<Option<Vec<f32>>>;

    /// Top-k most similar watched items for a candidate, scoped to the
    /// given watched-id set, with engagement metadata joined in
    async fn nearest_watched(
        &self,
        media_type: MediaType,
        candidate_tmdb_id: i64,
        watched_ids: &HashSet<i64>,
        k: usize,
    ) -> DiscoveryResult<Vec<WatchedNeighbor>>;

    /// Whether an embedding model is configured at all
    fn is_configured(&self) -> bool;
}

/// Taste and library collaborator
///
/// Everything the pipeline needs to know about one user: their aggregated
/// taste embedding, engagement history, library contents, and dislike
/// handling.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TasteProfile: Send + Sync {
    /// Aggregated taste embedding, absent for users with no watch history
    async fn taste_vector(
        &self,
        user_id: Uuid,
        media_type: MediaType,
    ) -> DiscoveryResult<Option<Vec<f32>>>;

    /// The user's most recently engaged title ids, newest first
    async fn recent_engagements(
        &self,
        user_id: Uuid,
        media_type: MediaType,
        limit: usize,
    ) -> DiscoveryResult<Vec<i64>>;

    /// Title ids the user rated at or above `min_rating` (out of 10)
    async fn top_rated(
        &self,
        user_id: Uuid,
        media_type: MediaType,
        min_rating: f32,
        limit: usize,
    ) -> DiscoveryResult<Vec<i64>>;

    /// Every title id the user has watched
    async fn watched_ids(
        &self,
        user_id: Uuid,
        media_type: MediaType,
    ) -> DiscoveryResult<HashSet<i64>>;

    /// Title ids already present in the media library
    async fn library_ids(&self, media_type: MediaType) -> DiscoveryResult<HashSet<i64>>;

    /// Title ids the user has explicitly disliked
    async fn disliked_ids(
        &self,
        user_id: Uuid,
        media_type: MediaType,
    ) -> DiscoveryResult<HashSet<i64>>;

    /// Per-user dislike policy override, if the user has set one
    async fn dislike_policy(&self, user_id: Uuid) -> DiscoveryResult<Option<DislikePolicy>>;

    /// Linked per-user catalog token, required for the user-feed source
    async fn user_feed_token(&self, user_id: Uuid) -> DiscoveryResult<Option<String>>;

    /// Genre → play count over the user's recent consumption
    async fn genre_history(
        &self,
        user_id: Uuid,
        media_type: MediaType,
    ) -> DiscoveryResult<HashMap<String, u32>>;

    /// Title ids recommended to this user in recent runs
    async fn recently_recommended(
        &self,
        user_id: Uuid,
        media_type: MediaType,
    ) -> DiscoveryResult<HashSet<i64>>;
}

/// Which optional collaborators are usable this run
///
/// Computed once at run start instead of checking configuration at every
/// call site; an unconfigured provider means its sources are skipped
/// silently, never an error.
#[derive(Debug, Clone, Copy)]
pub struct ProviderAvailability {
    pub catalog: bool,
    pub embeddings: bool,
}

impl ProviderAvailability {
    pub fn probe(catalog: &dyn CatalogProvider, vectors: &dyn VectorStore) -> Self {
        let availability = Self {
            catalog: catalog.is_configured(),
            embeddings: vectors.is_configured(),
        };

        tracing::debug!(
            catalog = availability.catalog,
            embeddings = availability.embeddings,
            "Probed provider availability"
        );

        availability
    }
}
