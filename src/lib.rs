//! Discovery and recommendation core for a media-library companion service.
//!
//! Sources candidate titles from external catalogs into global and
//! personalized pools, enriches missing metadata, scores candidates on four
//! signals against the user's taste, selects a diverse top-N, generates
//! watched-item evidence, and persists ranked results. The HTTP surface,
//! scheduler, and UI live in the host application; this crate is invoked by
//! an external scheduler through [`DiscoveryEngine`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod providers;
pub mod services;

pub use config::{Config, DiscoveryConfig, DislikePolicy, ScoringWeights};
pub use db::{create_pool, create_redis_client, PoolCache, RecommendationStore};
pub use error::{DiscoveryError, DiscoveryResult};
pub use models::{
    CandidateSource, Evidence, EvidenceType, MediaType, PoolSnapshot, RawCandidate, Run,
    RunCounts, RunStatus, ScoredCandidate, SelectionResult,
};
pub use providers::{CatalogProvider, ProviderAvailability, TasteProfile, TmdbProvider, VectorStore};
pub use services::orchestrator::{DiscoveryEngine, RunPreview, RunSummary};

/// Initializes tracing for binaries embedding the engine
///
/// Respects `RUST_LOG`; defaults to info-level output for this crate.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mediascout=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
